//! # Bill Computation
//!
//! The arithmetic half of checkout. kirana-db loads the rows, calls into here
//! for the numbers, then commits the ledgers; `quote` and `checkout` share
//! this code so a quoted total is exactly the charged total.
//!
//! ## Bill Steps
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. lines       flash line → flash price × qty                          │
//! │                 other line → dynamic unit price × qty                   │
//! │  2. subtotal    Σ line totals                                           │
//! │  3. coupon      validated against subtotal + store                      │
//! │                 delivery_deal capped at the delivery fee                │
//! │                 others capped at the subtotal                           │
//! │  4. delivery    fee, waived when subtotal >= free threshold             │
//! │                 + peak slot surcharge                                   │
//! │  5. tip         0 ..= max_tip                                           │
//! │  6. loyalty     points × point value, capped at the running total       │
//! │  7. total       max(0, subtotal - coupon + fee + surcharge + tip        │
//! │                        - loyalty)                                       │
//! │                                                                         │
//! │  earned points = ⌊total / loyalty_earn_per⌋                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::flash_sale::flash_price;
use crate::money::Money;
use crate::offer::evaluate_coupon;
use crate::pricing::{quote_price, PriceQuote};
use crate::types::{FlashSale, Offer, OfferType, Product};
use crate::validation::{validate_price, validate_quantity, validate_tip};
use crate::{MAX_AMOUNT, MAX_CART_LINES, MAX_ITEM_QUANTITY};

// =============================================================================
// Policy
// =============================================================================

/// Store-wide checkout knobs. Loaded from the `[checkout]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(default)]
#[ts(export)]
pub struct CheckoutPolicy {
    pub delivery_fee_cents: i64,
    /// Subtotal at which delivery becomes free.
    pub free_delivery_threshold_cents: i64,
    pub peak_slot_surcharge_cents: i64,
    /// Orders per store per delivery slot.
    pub slot_capacity: i64,
    pub max_tip_cents: i64,
    /// Bill amount that earns one loyalty point.
    pub loyalty_earn_per_cents: i64,
    /// What one loyalty point is worth when redeemed.
    pub loyalty_point_value_cents: i64,
}

impl Default for CheckoutPolicy {
    fn default() -> Self {
        CheckoutPolicy {
            delivery_fee_cents: 4000,
            free_delivery_threshold_cents: 49900,
            peak_slot_surcharge_cents: 3000,
            slot_capacity: 20,
            max_tip_cents: 20000,
            loyalty_earn_per_cents: 10000,
            loyalty_point_value_cents: 100,
        }
    }
}

impl CheckoutPolicy {
    pub fn delivery_fee(&self) -> Money {
        Money::from_cents(self.delivery_fee_cents)
    }

    pub fn free_delivery_threshold(&self) -> Money {
        Money::from_cents(self.free_delivery_threshold_cents)
    }

    pub fn peak_slot_surcharge(&self) -> Money {
        Money::from_cents(self.peak_slot_surcharge_cents)
    }

    pub fn max_tip(&self) -> Money {
        Money::from_cents(self.max_tip_cents)
    }

    /// Points earned on a bill total.
    pub fn points_earned(&self, total: Money) -> i64 {
        if self.loyalty_earn_per_cents <= 0 || total.is_negative() {
            return 0;
        }
        total.cents() / self.loyalty_earn_per_cents
    }
}

// =============================================================================
// Bill Types
// =============================================================================

/// One priced cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BillLine {
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
    /// Set when the line is bought through a flash sale.
    pub flash_sale_id: Option<String>,
    /// The dynamic-price breakdown for non-flash lines.
    pub quote: Option<PriceQuote>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Bill {
    pub lines: Vec<BillLine>,
    pub subtotal: Money,
    pub coupon_code: Option<String>,
    pub coupon_discount: Money,
    pub delivery_fee: Money,
    pub slot_surcharge: Money,
    pub tip: Money,
    pub loyalty_points_redeemed: i64,
    pub loyalty_discount: Money,
    pub total: Money,
    pub loyalty_points_earned: i64,
}

/// Inputs to [`compute_bill`] besides the priced lines.
#[derive(Debug, Clone)]
pub struct BillOptions<'a> {
    pub store_id: &'a str,
    /// The code the shopper typed, if any.
    pub coupon_code: Option<&'a str>,
    /// The offer that code resolved to.
    pub offer: Option<&'a Offer>,
    pub slot_is_peak: bool,
    pub tip: Money,
    pub loyalty_points_requested: i64,
    pub loyalty_points_available: i64,
    pub now: DateTime<Utc>,
}

// =============================================================================
// Line Pricing
// =============================================================================

/// Prices one cart line.
///
/// Flash lines ignore bulk and time-of-day rules. `delivery_time` is the
/// local time the order will be delivered (slot start, or now).
pub fn price_line(
    product: &Product,
    store_id: &str,
    quantity: i64,
    flash_sale: Option<&FlashSale>,
    delivery_time: NaiveDateTime,
) -> CoreResult<BillLine> {
    validate_quantity(quantity)?;
    validate_price(product.base_price())?;

    if !product.is_active {
        return Err(CoreError::not_found("Product", &product.id));
    }
    if product.store_id != store_id {
        return Err(CoreError::WrongStore {
            product: product.name.clone(),
            store_id: store_id.to_string(),
        });
    }

    match flash_sale {
        Some(sale) => {
            if sale.product_id != product.id {
                return Err(ValidationError::InvalidFormat {
                    field: "flash_sale_id".to_string(),
                    reason: format!("flash sale {} is not for product {}", sale.id, product.id),
                }
                .into());
            }
            let unit = flash_price(product.base_price(), sale.discount_percent);
            Ok(BillLine {
                product_id: product.id.clone(),
                name: product.name.clone(),
                quantity,
                unit_price: unit,
                line_total: unit.checked_times(quantity).ok_or_else(line_total_out_of_range)?,
                flash_sale_id: Some(sale.id.clone()),
                quote: None,
            })
        }
        None => {
            let quote = quote_price(&product.id, product.base_price(), quantity, delivery_time);
            Ok(BillLine {
                product_id: product.id.clone(),
                name: product.name.clone(),
                quantity,
                unit_price: quote.final_price,
                line_total: quote.line_total().ok_or_else(line_total_out_of_range)?,
                flash_sale_id: None,
                quote: Some(quote),
            })
        }
    }
}

fn line_total_out_of_range() -> CoreError {
    ValidationError::OutOfRange {
        field: "line_total".to_string(),
        min: 0,
        max: MAX_AMOUNT.cents() * MAX_ITEM_QUANTITY,
    }
    .into()
}

// =============================================================================
// Bill
// =============================================================================

/// Computes the bill for already priced lines.
///
/// A supplied coupon that does not validate fails the whole bill with
/// [`CoreError::CouponRejected`] carrying the validator's message.
pub fn compute_bill(
    lines: Vec<BillLine>,
    options: &BillOptions<'_>,
    policy: &CheckoutPolicy,
) -> CoreResult<Bill> {
    if lines.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        }
        .into());
    }
    if lines.len() > MAX_CART_LINES {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_CART_LINES as i64,
        }
        .into());
    }
    validate_tip(options.tip, policy.max_tip())?;
    if options.loyalty_points_requested < 0 {
        return Err(ValidationError::must_be_positive("loyalty_points").into());
    }
    if options.loyalty_points_requested > options.loyalty_points_available {
        return Err(CoreError::InsufficientLoyaltyPoints {
            available: options.loyalty_points_available,
            requested: options.loyalty_points_requested,
        });
    }

    let subtotal: Money = lines.iter().map(|l| l.line_total).sum();

    let delivery_fee = if subtotal >= policy.free_delivery_threshold() {
        Money::zero()
    } else {
        policy.delivery_fee()
    };
    let slot_surcharge = if options.slot_is_peak {
        policy.peak_slot_surcharge()
    } else {
        Money::zero()
    };

    let (coupon_code, coupon_discount) = match options.coupon_code {
        None => (None, Money::zero()),
        Some(code) => {
            let validation = evaluate_coupon(options.offer, Some(options.store_id), subtotal, options.now);
            if !validation.valid {
                return Err(CoreError::CouponRejected(validation.message));
            }
            let cap = match options.offer.map(|o| o.offer_type) {
                Some(OfferType::DeliveryDeal) => delivery_fee,
                _ => subtotal,
            };
            (Some(code.to_ascii_uppercase()), validation.discount.min(cap))
        }
    };

    let before_loyalty =
        (subtotal - coupon_discount + delivery_fee + slot_surcharge + options.tip).floor_zero();

    let (loyalty_points_redeemed, loyalty_discount) = redeem_points(
        options.loyalty_points_requested,
        policy.loyalty_point_value_cents,
        before_loyalty,
    );

    let total = (before_loyalty - loyalty_discount).floor_zero();

    Ok(Bill {
        lines,
        subtotal,
        coupon_code,
        coupon_discount,
        delivery_fee,
        slot_surcharge,
        tip: options.tip,
        loyalty_points_redeemed,
        loyalty_discount,
        total,
        loyalty_points_earned: policy.points_earned(total),
    })
}

/// Points actually spent and their value, never worth more than `cap`.
fn redeem_points(requested: i64, point_value_cents: i64, cap: Money) -> (i64, Money) {
    if requested <= 0 || point_value_cents <= 0 {
        return (0, Money::zero());
    }
    // Enough points to cover the cap, rounded up.
    let needed = cap.cents().saturating_add(point_value_cents - 1) / point_value_cents;
    let used = requested.min(needed);
    let value = Money::from_cents(used.saturating_mul(point_value_cents)).min(cap);
    (used, value)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 6, 30, 0).unwrap()
    }

    fn product(price_rupees: i64) -> Product {
        Product {
            id: "p-1".into(),
            store_id: "store-1".into(),
            name: "Basmati Rice 1kg".into(),
            base_price_cents: price_rupees * 100,
            stock: 50,
            low_stock_threshold: 5,
            is_active: true,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn options<'a>() -> BillOptions<'a> {
        BillOptions {
            store_id: "store-1",
            coupon_code: None,
            offer: None,
            slot_is_peak: false,
            tip: Money::zero(),
            loyalty_points_requested: 0,
            loyalty_points_available: 0,
            now: now(),
        }
    }

    fn offer(offer_type: OfferType, percent: Option<u32>, amount: Option<i64>) -> Offer {
        Offer {
            id: "o-1".into(),
            code: Some("WELCOME20".into()),
            title: "Welcome".into(),
            discount_percent: percent,
            discount_amount_cents: amount,
            min_order_amount_cents: 0,
            max_discount_cents: None,
            offer_type,
            store_id: None,
            valid_from: now() - Duration::days(1),
            valid_until: now() + Duration::days(1),
            is_active: true,
            created_at: now(),
        }
    }

    #[test]
    fn test_line_uses_dynamic_price() {
        let line = price_line(&product(100), "store-1", 5, None, noon()).unwrap();
        assert_eq!(line.unit_price, Money::from_rupees(95));
        assert_eq!(line.line_total, Money::from_rupees(475));
        assert!(line.quote.is_some());
    }

    #[test]
    fn test_flash_line_ignores_bulk() {
        let p = product(100);
        let sale = FlashSale {
            id: "fs-1".into(),
            product_id: p.id.clone(),
            discount_percent: 30,
            start_time: now(),
            end_time: now() + Duration::hours(1),
            max_quantity: 10,
            sold_quantity: 0,
            is_active: true,
            created_at: now(),
        };
        let line = price_line(&p, "store-1", 5, Some(&sale), noon()).unwrap();
        assert_eq!(line.unit_price, Money::from_rupees(70));
        assert_eq!(line.flash_sale_id.as_deref(), Some("fs-1"));
    }

    #[test]
    fn test_oversized_price_rejected() {
        let mut p = product(100);
        p.base_price_cents = i64::MAX / 2;

        let err = price_line(&p, "store-1", 3, None, noon()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::OutOfRange { ref field, .. }) if field == "price"
        ));
    }

    #[test]
    fn test_line_from_other_store_rejected() {
        let err = price_line(&product(100), "store-2", 1, None, noon()).unwrap_err();
        assert!(matches!(err, CoreError::WrongStore { .. }));
    }

    #[test]
    fn test_small_order_pays_delivery() {
        let lines = vec![price_line(&product(100), "store-1", 2, None, noon()).unwrap()];
        let bill = compute_bill(lines, &options(), &CheckoutPolicy::default()).unwrap();
        assert_eq!(bill.subtotal, Money::from_rupees(200));
        assert_eq!(bill.delivery_fee, Money::from_rupees(40));
        assert_eq!(bill.total, Money::from_rupees(240));
        assert_eq!(bill.loyalty_points_earned, 2);
    }

    #[test]
    fn test_free_delivery_and_peak_surcharge() {
        let lines = vec![price_line(&product(500), "store-1", 1, None, noon()).unwrap()];
        let mut opts = options();
        opts.slot_is_peak = true;
        opts.tip = Money::from_rupees(20);
        let bill = compute_bill(lines, &opts, &CheckoutPolicy::default()).unwrap();
        assert_eq!(bill.delivery_fee, Money::zero());
        assert_eq!(bill.slot_surcharge, Money::from_rupees(30));
        assert_eq!(bill.total, Money::from_rupees(550));
    }

    #[test]
    fn test_delivery_deal_capped_at_fee() {
        let lines = vec![price_line(&product(100), "store-1", 1, None, noon()).unwrap()];
        let deal = offer(OfferType::DeliveryDeal, None, Some(10000));
        let mut opts = options();
        opts.coupon_code = Some("freeship");
        opts.offer = Some(&deal);
        let bill = compute_bill(lines, &opts, &CheckoutPolicy::default()).unwrap();
        assert_eq!(bill.coupon_discount, Money::from_rupees(40));
        assert_eq!(bill.total, Money::from_rupees(100));
        assert_eq!(bill.coupon_code.as_deref(), Some("FREESHIP"));
    }

    #[test]
    fn test_flat_coupon_capped_at_subtotal() {
        let lines = vec![price_line(&product(30), "store-1", 1, None, noon()).unwrap()];
        let flat = offer(OfferType::SiteWide, None, Some(5000));
        let mut opts = options();
        opts.coupon_code = Some("FLAT50");
        opts.offer = Some(&flat);
        let bill = compute_bill(lines, &opts, &CheckoutPolicy::default()).unwrap();
        assert_eq!(bill.coupon_discount, Money::from_rupees(30));
        assert_eq!(bill.total, Money::from_rupees(40));
    }

    #[test]
    fn test_invalid_coupon_fails_bill() {
        let lines = vec![price_line(&product(100), "store-1", 1, None, noon()).unwrap()];
        let mut opts = options();
        opts.coupon_code = Some("NOPE");
        let err = compute_bill(lines, &opts, &CheckoutPolicy::default()).unwrap_err();
        assert_eq!(err, CoreError::CouponRejected("Invalid coupon code".into()));
    }

    #[test]
    fn test_loyalty_capped_at_total() {
        let lines = vec![price_line(&product(10), "store-1", 1, None, noon()).unwrap()];
        let mut opts = options();
        opts.loyalty_points_requested = 100;
        opts.loyalty_points_available = 100;
        let bill = compute_bill(lines, &opts, &CheckoutPolicy::default()).unwrap();
        // ₹10 + ₹40 delivery = ₹50, so only 50 points are spent
        assert_eq!(bill.loyalty_points_redeemed, 50);
        assert_eq!(bill.loyalty_discount, Money::from_rupees(50));
        assert_eq!(bill.total, Money::zero());
        assert_eq!(bill.loyalty_points_earned, 0);
    }

    #[test]
    fn test_loyalty_over_balance_rejected() {
        let lines = vec![price_line(&product(10), "store-1", 1, None, noon()).unwrap()];
        let mut opts = options();
        opts.loyalty_points_requested = 10;
        opts.loyalty_points_available = 3;
        let err = compute_bill(lines, &opts, &CheckoutPolicy::default()).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientLoyaltyPoints { available: 3, requested: 10 }));
    }

    #[test]
    fn test_tip_over_max_and_empty_cart() {
        let policy = CheckoutPolicy::default();
        let lines = vec![price_line(&product(10), "store-1", 1, None, noon()).unwrap()];
        let mut opts = options();
        opts.tip = Money::from_rupees(500);
        assert!(compute_bill(lines, &opts, &policy).is_err());
        assert!(compute_bill(Vec::new(), &options(), &policy).is_err());
    }
}
