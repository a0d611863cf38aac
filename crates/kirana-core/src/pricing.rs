//! # Pricing Engine
//!
//! Turns a product's base price into a quoted unit price for a given quantity
//! and delivery time.
//!
//! ## Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Dynamic Price Rules                               │
//! │                                                                         │
//! │  Rule            When                         Effect on base price     │
//! │  ─────────────── ──────────────────────────── ──────────────────────   │
//! │  Bulk            quantity >= 5                -min(20, ⌊q/5⌋×5) %      │
//! │  Peak hour       delivery hour in 18..=21     +15 %                    │
//! │  Early bird      delivery hour in 5..=8       -10 %                    │
//! │                                                                         │
//! │  Peak and early bird never overlap. Bulk combines with either.         │
//! │  Every percentage is taken of the BASE price, never compounded.        │
//! │                                                                         │
//! │  final   = max(0, base - Σ discounts + Σ surcharges)                   │
//! │  savings = Σ discounts - Σ surcharges       (negative at peak hours)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine is a pure function of its arguments: the caller resolves
//! "now" and passes it in, so two calls with the same inputs agree exactly.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Constants
// =============================================================================

/// Quantity at which the bulk discount starts.
pub const BULK_MIN_QUANTITY: i64 = 5;

/// Bulk discount grows by this many percent per `BULK_MIN_QUANTITY` units.
pub const BULK_STEP_PERCENT: u32 = 5;

/// Bulk discount never exceeds this.
pub const BULK_MAX_PERCENT: u32 = 20;

pub const PEAK_HOURS: RangeInclusive<u32> = 18..=21;
pub const PEAK_SURCHARGE_PERCENT: u32 = 15;

pub const EARLY_BIRD_HOURS: RangeInclusive<u32> = 5..=8;
pub const EARLY_BIRD_DISCOUNT_PERCENT: u32 = 10;

// =============================================================================
// Quote Types
// =============================================================================

/// One itemised discount or surcharge on a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PriceAdjustment {
    /// Display label, e.g. "Bulk discount (10%)".
    pub label: String,
    pub percent: u32,
    pub amount: Money,
}

/// A per-unit price quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PriceQuote {
    pub product_id: String,
    pub quantity: i64,
    pub base_price: Money,
    pub final_price: Money,
    pub discounts: Vec<PriceAdjustment>,
    pub surcharges: Vec<PriceAdjustment>,
    /// Discounts minus surcharges. Negative when a surcharge dominates.
    pub savings: Money,
}

impl PriceQuote {
    /// Line total for the quoted quantity. `None` on overflow.
    pub fn line_total(&self) -> Option<Money> {
        self.final_price.checked_times(self.quantity)
    }
}

// =============================================================================
// Rules
// =============================================================================

/// Bulk discount percentage for a quantity.
///
/// ```rust
/// use kirana_core::pricing::bulk_discount_percent;
///
/// assert_eq!(bulk_discount_percent(4), 0);
/// assert_eq!(bulk_discount_percent(5), 5);
/// assert_eq!(bulk_discount_percent(14), 10);
/// assert_eq!(bulk_discount_percent(50), 20);
/// ```
pub fn bulk_discount_percent(quantity: i64) -> u32 {
    if quantity < BULK_MIN_QUANTITY {
        return 0;
    }
    let steps = (quantity / BULK_MIN_QUANTITY).min(i64::from(BULK_MAX_PERCENT)) as u32;
    (steps * BULK_STEP_PERCENT).min(BULK_MAX_PERCENT)
}

#[inline]
pub fn is_peak_hour(hour: u32) -> bool {
    PEAK_HOURS.contains(&hour)
}

#[inline]
pub fn is_early_bird_hour(hour: u32) -> bool {
    EARLY_BIRD_HOURS.contains(&hour)
}

/// Computes the dynamic unit price.
///
/// `delivery_time` is local wall-clock time at the store; only its hour is
/// consulted.
pub fn quote_price(
    product_id: &str,
    base_price: Money,
    quantity: i64,
    delivery_time: NaiveDateTime,
) -> PriceQuote {
    let hour = delivery_time.hour();
    let mut discounts = Vec::new();
    let mut surcharges = Vec::new();

    let bulk = bulk_discount_percent(quantity);
    if bulk > 0 {
        discounts.push(PriceAdjustment {
            label: format!("Bulk discount ({}%)", bulk),
            percent: bulk,
            amount: base_price.percent(bulk),
        });
    }

    if is_peak_hour(hour) {
        surcharges.push(PriceAdjustment {
            label: format!("Peak hour surcharge ({}%)", PEAK_SURCHARGE_PERCENT),
            percent: PEAK_SURCHARGE_PERCENT,
            amount: base_price.percent(PEAK_SURCHARGE_PERCENT),
        });
    } else if is_early_bird_hour(hour) {
        discounts.push(PriceAdjustment {
            label: format!("Early bird discount ({}%)", EARLY_BIRD_DISCOUNT_PERCENT),
            percent: EARLY_BIRD_DISCOUNT_PERCENT,
            amount: base_price.percent(EARLY_BIRD_DISCOUNT_PERCENT),
        });
    }

    let total_discount: Money = discounts.iter().map(|d| d.amount).sum();
    let total_surcharge: Money = surcharges.iter().map(|s| s.amount).sum();

    PriceQuote {
        product_id: product_id.to_string(),
        quantity,
        base_price,
        final_price: (base_price - total_discount + total_surcharge).floor_zero(),
        discounts,
        surcharges,
        savings: total_discount - total_surcharge,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
