//! # Error Types
//!
//! Business-rule rejections and input validation failures for kirana-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  kirana-core errors (this file)                                        │
//! │  ├── CoreError        - Rejections a shopper can act on                │
//! │  └── ValidationError  - Malformed input                                │
//! │                                                                         │
//! │  kirana-db errors (separate crate)                                     │
//! │  └── DbError          - Storage failures, wraps CoreError as Rejected  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError::Rejected → caller        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Message Rules
//! Every rejection names the exact number the shopper needs: the remaining
//! flash-sale count, the wallet balance, the gift-card balance, the minimum
//! order. A generic "failed" is never acceptable here.
//!
//! Coupon rejections are NOT errors; see [`crate::offer::CouponValidation`].

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Business-rule rejections.
///
/// None of these leave a ledger half-written: the storage layer only raises
/// them before its guarded write, or rolls the whole transaction back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Unknown product/flash sale/gift card/order.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A sale would take stock below zero.
    ///
    /// ```text
    /// Checkout (qty: 5)
    ///      │
    ///      ▼
    /// stock = 3
    ///      │
    ///      ▼
    /// InsufficientStock { product: "Amul Milk 1L", available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// UI shows: "Only 3 left in stock for Amul Milk 1L"
    /// ```
    #[error("Only {available} left in stock for {product} (requested {requested})")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    /// The flash sale has no units left.
    #[error("Flash sale sold out!")]
    FlashSaleSoldOut,

    /// The flash sale has fewer units left than requested.
    #[error("Only {remaining} items available!")]
    FlashSaleInsufficient { remaining: i64 },

    /// Outside the sale window, or switched off.
    #[error("Flash sale is not active")]
    FlashSaleInactive,

    #[error("Flash sale starts at {starts_at}")]
    FlashSaleNotStarted { starts_at: DateTime<Utc> },

    #[error("Flash sale ended at {ended_at}")]
    FlashSaleEnded { ended_at: DateTime<Utc> },

    #[error("Insufficient wallet balance: available {available}, required {required}")]
    InsufficientWalletBalance { available: Money, required: Money },

    #[error("Insufficient loyalty points: available {available}, requested {requested}")]
    InsufficientLoyaltyPoints { available: i64, requested: i64 },

    #[error("Gift card has already been redeemed")]
    GiftCardRedeemed,

    #[error("Gift card expired on {expired_at}")]
    GiftCardExpired { expired_at: DateTime<Utc> },

    #[error("Redeem amount {requested} exceeds gift card balance of {balance}")]
    GiftCardInsufficient { balance: Money, requested: Money },

    /// A coupon was supplied at checkout and did not validate.
    ///
    /// Carries the validator's message verbatim.
    #[error("{0}")]
    CouponRejected(String),

    #[error("Delivery slot {slot} is fully booked")]
    SlotFull { slot: String },

    #[error("Delivery slot {slot} is not offered")]
    SlotUnavailable { slot: String },

    /// Product belongs to another store.
    #[error("{product} is not sold by store {store_id}")]
    WrongStore { product: String, store_id: String },

    /// Order is not in a state that allows the requested transition.
    #[error("Order {order_id} is {status}, cannot {action}")]
    InvalidOrderState {
        order_id: String,
        status: String,
        action: String,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, raised before any business rule runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

impl ValidationError {
    pub fn must_be_positive(field: impl Into<String>) -> Self {
        ValidationError::MustBePositive {
            field: field.into(),
        }
    }
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flash_sale_messages_are_exact() {
        assert_eq!(
            CoreError::FlashSaleInsufficient { remaining: 2 }.to_string(),
            "Only 2 items available!"
        );
        assert_eq!(CoreError::FlashSaleSoldOut.to_string(), "Flash sale sold out!");
    }

    #[test]
    fn test_wallet_message_names_amounts() {
        let err = CoreError::InsufficientWalletBalance {
            available: Money::from_rupees(50),
            required: Money::from_rupees(100),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient wallet balance: available ₹50.00, required ₹100.00"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::must_be_positive("amount").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.to_string(), "Validation error: amount must be positive");
    }
}
