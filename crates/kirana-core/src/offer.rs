//! # Offer / Coupon Evaluation
//!
//! Decides whether a coupon applies to an order and how much it takes off.
//!
//! ## Evaluation Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  evaluate_coupon(offer, store_id, order_amount, now)                    │
//! │                                                                         │
//! │  1. Offer found?                 no  → "Invalid coupon code"           │
//! │  2. is_active?                   no  → "This coupon is no longer active"│
//! │  3. now >= valid_from?           no  → "...not valid until <date>"     │
//! │  4. now <= valid_until?          no  → "...expired on <date>"          │
//! │  5. store scope matches?         no  → "...not valid for this store"   │
//! │  6. order >= min_order_amount?   no  → "Minimum order amount of ₹X..." │
//! │  7. discount:                                                          │
//! │       Percent(p) → order × p%, capped at max_discount                  │
//! │       Flat(a)    → a                                                   │
//! │                                                                         │
//! │  Rejections are a normal outcome, so they come back as                 │
//! │  CouponValidation { valid: false, .. }, never as an Err.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{Offer, OfferDiscount};

/// Outcome of validating a coupon against an order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CouponValidation {
    pub valid: bool,
    pub offer: Option<Offer>,
    pub discount: Money,
    /// Shown to the shopper as-is.
    pub message: String,
}

impl CouponValidation {
    fn rejected(offer: Option<&Offer>, message: impl Into<String>) -> Self {
        CouponValidation {
            valid: false,
            offer: offer.cloned(),
            discount: Money::zero(),
            message: message.into(),
        }
    }
}

/// Date format used in coupon messages ("15 Mar 2024").
const MESSAGE_DATE_FORMAT: &str = "%d %b %Y";

/// Validates a looked-up coupon against an order.
///
/// `offer` is `None` when the code did not match any offer.
pub fn evaluate_coupon(
    offer: Option<&Offer>,
    store_id: Option<&str>,
    order_amount: Money,
    now: DateTime<Utc>,
) -> CouponValidation {
    let Some(offer) = offer else {
        return CouponValidation::rejected(None, "Invalid coupon code");
    };

    if !offer.is_active {
        return CouponValidation::rejected(Some(offer), "This coupon is no longer active");
    }

    if now < offer.valid_from {
        return CouponValidation::rejected(
            Some(offer),
            format!(
                "This coupon is not valid until {}",
                offer.valid_from.format(MESSAGE_DATE_FORMAT)
            ),
        );
    }

    if now > offer.valid_until {
        return CouponValidation::rejected(
            Some(offer),
            format!(
                "This coupon expired on {}",
                offer.valid_until.format(MESSAGE_DATE_FORMAT)
            ),
        );
    }

    if let Some(scope) = offer.store_id.as_deref() {
        if store_id != Some(scope) {
            return CouponValidation::rejected(Some(offer), "This coupon is not valid for this store");
        }
    }

    if order_amount < offer.min_order_amount() {
        return CouponValidation::rejected(
            Some(offer),
            format!("Minimum order amount of {} required", offer.min_order_amount()),
        );
    }

    let discount = match offer.discount() {
        Some(OfferDiscount::Percent(pct)) => {
            let raw = order_amount.percent(pct);
            match offer.max_discount() {
                Some(cap) => raw.min(cap),
                None => raw,
            }
        }
        Some(OfferDiscount::Flat(amount)) => amount,
        None => {
            return CouponValidation::rejected(Some(offer), "This coupon is misconfigured");
        }
    };

    CouponValidation {
        valid: true,
        offer: Some(offer.clone()),
        discount,
        message: format!("Coupon applied! You saved {}", discount),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
