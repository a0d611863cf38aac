//! # kirana-core: Pure Business Logic for the Kirana Commerce Ledger
//!
//! Everything that decides a number (a price, a discount, a bill total, a
//! stock transition) lives here as a pure function with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Kirana Ledger Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │         Storefront (React) / Payment gateway callback           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kirana-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │  ┌─────────┐ ┌─────────┐ ┌───────────┐ ┌───────┐ ┌──────────┐  │   │
//! │  │  │ pricing │ │  offer  │ │flash_sale │ │ stock │ │ checkout │  │   │
//! │  │  │ quotes  │ │ coupons │ │ counters  │ │ rules │ │   bill   │  │   │
//! │  │  └─────────┘ └─────────┘ └───────────┘ └───────┘ └──────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK READS • PURE FUNCTIONS        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              kirana-db (ledgers, atomic updates)                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Ledger records (Product, FlashSale, Wallet, GiftCard, Order, ...)
//! - [`money`] - Money in integer paise
//! - [`error`] - Rejections and validation errors
//! - [`validation`] - Input checks
//! - [`pricing`] - Dynamic price quotes
//! - [`offer`] - Coupon evaluation
//! - [`flash_sale`] - Flash-sale availability and purchase rules
//! - [`stock`] - Stock transitions and alert triggers
//! - [`slots`] - Delivery slot grid
//! - [`checkout`] - Bill computation and checkout policy
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::NaiveDate;
//! use kirana_core::pricing::quote_price;
//! use kirana_core::Money;
//!
//! let evening = NaiveDate::from_ymd_opt(2024, 3, 15)
//!     .unwrap()
//!     .and_hms_opt(19, 0, 0)
//!     .unwrap();
//!
//! // 10 units at peak hour: -10% bulk, +15% surcharge
//! let quote = quote_price("p-1", Money::from_rupees(100), 10, evening);
//! assert_eq!(quote.final_price, Money::from_rupees(105));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod checkout;
pub mod error;
pub mod flash_sale;
pub mod money;
pub mod offer;
pub mod pricing;
pub mod slots;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use checkout::{Bill, BillLine, CheckoutPolicy};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use offer::CouponValidation;
pub use pricing::PriceQuote;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Low-stock threshold for products created without one.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 5;

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Stops a typo (1000 instead of 10) from draining a store's stock.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Largest single monetary input: ₹10 crore, in paise.
///
/// Applies to list prices, top-ups, debits, gift-card values and offer
/// amounts. Keeps every line total and bill sum far inside `i64`.
pub const MAX_AMOUNT: Money = Money::from_rupees(100_000_000);

/// Maximum lines in one order.
pub const MAX_CART_LINES: usize = 100;
