//! # Flash-Sale Rules
//!
//! Availability math and purchase preconditions for flash sales. The atomic
//! increment itself lives in kirana-db; this module decides what a purchase
//! is allowed to do and what to tell the shopper when it is not.
//!
//! ```text
//!   max_quantity = 10
//!   ├──────────── sold 8 ────────────┤── 2 ──┤
//!                                     remaining
//!
//!   purchase(3) → "Only 2 items available!"   (sold stays 8)
//!   purchase(2) → sold 10
//!   purchase(1) → "Flash sale sold out!"
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::FlashSale;
use crate::validation::{validate_discount_percent, validate_quantity};

/// Remaining units at or below this count as "almost gone".
pub const FLASH_LOW_STOCK_THRESHOLD: i64 = 5;

/// Read-only view of a sale's counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FlashSaleAvailability {
    pub flash_sale_id: String,
    pub remaining_stock: i64,
    pub is_sold_out: bool,
    pub is_low_stock: bool,
    /// 0.0 to 100.0
    pub percent_sold: f64,
}

pub fn availability(sale: &FlashSale) -> FlashSaleAvailability {
    let remaining = sale.remaining();
    let percent_sold = if sale.max_quantity > 0 {
        sale.sold_quantity as f64 * 100.0 / sale.max_quantity as f64
    } else {
        100.0
    };

    FlashSaleAvailability {
        flash_sale_id: sale.id.clone(),
        remaining_stock: remaining,
        is_sold_out: remaining <= 0,
        is_low_stock: remaining > 0 && remaining <= FLASH_LOW_STOCK_THRESHOLD,
        percent_sold,
    }
}

/// Checks whether `quantity` units may be bought from `sale` at `now`.
///
/// Called against a freshly read row after a guarded increment touched
/// nothing, so the error it returns names the real reason.
pub fn check_purchase(sale: &FlashSale, quantity: i64, now: DateTime<Utc>) -> CoreResult<()> {
    validate_quantity(quantity)?;

    if !sale.is_active {
        return Err(CoreError::FlashSaleInactive);
    }
    if now < sale.start_time {
        return Err(CoreError::FlashSaleNotStarted {
            starts_at: sale.start_time,
        });
    }
    if now > sale.end_time {
        return Err(CoreError::FlashSaleEnded {
            ended_at: sale.end_time,
        });
    }

    let remaining = sale.remaining();
    if remaining <= 0 {
        return Err(CoreError::FlashSaleSoldOut);
    }
    if quantity > remaining {
        return Err(CoreError::FlashSaleInsufficient { remaining });
    }

    Ok(())
}

/// Unit price during the sale: base minus `discount_percent`.
pub fn flash_price(base_price: Money, discount_percent: u32) -> Money {
    (base_price - base_price.percent(discount_percent)).floor_zero()
}

/// Validates the parameters of a new flash sale.
pub fn validate_new_sale(
    discount_percent: u32,
    max_quantity: i64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
) -> CoreResult<()> {
    validate_discount_percent(discount_percent)?;

    if max_quantity <= 0 {
        return Err(ValidationError::must_be_positive("max_quantity").into());
    }

    if start_time >= end_time {
        return Err(ValidationError::InvalidFormat {
            field: "end_time".to_string(),
            reason: "must be after start_time".to_string(),
        }
        .into());
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sale(max: i64, sold: i64) -> FlashSale {
        let now = Utc::now();
        FlashSale {
            id: "fs-1".into(),
            product_id: "p-1".into(),
            discount_percent: 30,
            start_time: now - Duration::hours(1),
            end_time: now + Duration::hours(1),
            max_quantity: max,
            sold_quantity: sold,
            is_active: true,
            created_at: now,
        }
    }

    #[test]
    fn test_insufficient_reports_exact_remaining() {
        let err = check_purchase(&sale(10, 8), 3, Utc::now()).unwrap_err();
        assert_eq!(err, CoreError::FlashSaleInsufficient { remaining: 2 });
        assert_eq!(err.to_string(), "Only 2 items available!");
    }

    #[test]
    fn test_sold_out() {
        let err = check_purchase(&sale(10, 10), 1, Utc::now()).unwrap_err();
        assert_eq!(err, CoreError::FlashSaleSoldOut);
    }

    #[test]
    fn test_window_and_active_flag() {
        let mut s = sale(10, 0);
        assert!(check_purchase(&s, 1, Utc::now()).is_ok());
        assert!(matches!(
            check_purchase(&s, 1, Utc::now() + Duration::hours(2)),
            Err(CoreError::FlashSaleEnded { .. })
        ));
        assert!(matches!(
            check_purchase(&s, 1, Utc::now() - Duration::hours(2)),
            Err(CoreError::FlashSaleNotStarted { .. })
        ));
        s.is_active = false;
        assert_eq!(check_purchase(&s, 1, Utc::now()), Err(CoreError::FlashSaleInactive));
    }

    #[test]
    fn test_availability() {
        let a = availability(&sale(10, 8));
        assert_eq!(a.remaining_stock, 2);
        assert!(a.is_low_stock);
        assert!(!a.is_sold_out);
        assert!((a.percent_sold - 80.0).abs() < f64::EPSILON);

        let gone = availability(&sale(10, 10));
        assert!(gone.is_sold_out);
        assert!(!gone.is_low_stock);

        let plenty = availability(&sale(100, 10));
        assert!(!plenty.is_low_stock);
    }

    #[test]
    fn test_flash_price() {
        assert_eq!(flash_price(Money::from_rupees(100), 30), Money::from_rupees(70));
        assert_eq!(flash_price(Money::from_rupees(100), 100), Money::zero());
    }

    #[test]
    fn test_validate_new_sale() {
        let now = Utc::now();
        assert!(validate_new_sale(30, 10, now, now + Duration::hours(1)).is_ok());
        assert!(validate_new_sale(0, 10, now, now + Duration::hours(1)).is_err());
        assert!(validate_new_sale(30, 0, now, now + Duration::hours(1)).is_err());
        assert!(validate_new_sale(30, 10, now, now).is_err());
    }
}
