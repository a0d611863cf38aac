//! # Money Module
//!
//! Provides the `Money` type for every balance, price and discount in the ledger.
//!
//! ## Why Integer Paise?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  WALLET BALANCES MUST SUM EXACTLY                                       │
//! │                                                                         │
//! │  The wallet invariant is: balance == Σ transaction amounts.             │
//! │  With floats, ₹0.10 credited 3 times is 0.30000000000000004.            │
//! │  The audit would flag a perfectly honest wallet.                        │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Paise (1 ₹ = 100 paise)                          │
//! │    10 + 10 + 10 = 30 paise, every time.                                 │
//! │    Percentages round half-up to the nearest paisa, once, explicitly.    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use kirana_core::money::Money;
//!
//! let price = Money::from_rupees(120);          // ₹120.00
//! let off = price.percent(15);                  // ₹18.00
//! assert_eq!((price - off).to_string(), "₹102.00");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in paise (the smallest INR unit).
///
/// Signed so that debits in the wallet ledger can be stored as negative
/// amounts and surcharges can make "savings" negative.
///
/// ```text
/// Product.base_price_cents ──► PriceQuote.final_price ──► Bill.subtotal
///                                                            │
///        Offer.discount ─────────────────────────────────────┤
///                                                            ▼
///                                   Bill.total ──► WalletTransaction.amount
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from paise.
    ///
    /// ```rust
    /// use kirana_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(29900).rupees(), 299);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from whole rupees.
    #[inline]
    pub const fn from_rupees(rupees: i64) -> Self {
        Money(rupees * 100)
    }

    /// Returns the value in paise.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-rupee part (truncated toward zero).
    #[inline]
    pub const fn rupees(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the paise part (always 0-99).
    #[inline]
    pub const fn paise_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Clamps negative values to zero.
    ///
    /// Prices and bill totals are floored here; ledger balances never need it
    /// because their writes are guarded.
    #[inline]
    pub const fn floor_zero(self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            self
        }
    }

    /// Returns `percent`% of this amount, rounded half-up to the paisa.
    ///
    /// ```rust
    /// use kirana_core::money::Money;
    ///
    /// // 15% of ₹99.99 = ₹14.9985 → ₹15.00
    /// assert_eq!(Money::from_cents(9999).percent(15).cents(), 1500);
    /// ```
    pub fn percent(&self, percent: u32) -> Money {
        self.basis_points(percent * 100)
    }

    /// Returns `bps`/10000 of this amount, rounded half-up to the paisa.
    ///
    /// i128 intermediate so a large order total times 10000 cannot overflow.
    pub fn basis_points(&self, bps: u32) -> Money {
        let scaled = self.0 as i128 * bps as i128;
        let rounded = if scaled >= 0 {
            (scaled + 5000) / 10000
        } else {
            (scaled - 5000) / 10000
        };
        Money(rounded as i64)
    }

    /// Multiplies a unit price by a line quantity.
    ///
    /// `None` when the product does not fit in `i64` paise.
    #[inline]
    pub fn checked_times(&self, qty: i64) -> Option<Self> {
        self.0.checked_mul(qty).map(Money)
    }

    /// The smaller of two amounts (used for discount caps).
    #[inline]
    pub fn min(self, other: Money) -> Money {
        if self <= other {
            self
        } else {
            other
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shown to users inside rejection messages, e.g. "Minimum order amount of ₹299.00".
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}₹{}.{:02}", sign, self.rupees().abs(), self.paise_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rupees_and_parts() {
        let money = Money::from_cents(29950);
        assert_eq!(money.rupees(), 299);
        assert_eq!(money.paise_part(), 50);
        assert_eq!(Money::from_rupees(299).cents(), 29900);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(29900).to_string(), "₹299.00");
        assert_eq!(Money::from_cents(5).to_string(), "₹0.05");
        assert_eq!(Money::from_cents(-5050).to_string(), "-₹50.50");
        assert_eq!(Money::zero().to_string(), "₹0.00");
    }

    #[test]
    fn test_percent_rounds_half_up() {
        // 20% of ₹1000 = ₹200
        assert_eq!(Money::from_rupees(1000).percent(20), Money::from_rupees(200));
        // 10% of ₹0.05 = 0.5 paise → 1 paisa
        assert_eq!(Money::from_cents(5).percent(10).cents(), 1);
        // 10% of ₹0.04 = 0.4 paise → 0
        assert_eq!(Money::from_cents(4).percent(10).cents(), 0);
    }

    #[test]
    fn test_negative_percent_is_symmetric() {
        assert_eq!(Money::from_cents(-5).percent(10).cents(), -1);
    }

    #[test]
    fn test_floor_zero() {
        assert_eq!(Money::from_cents(-1).floor_zero(), Money::zero());
        assert_eq!(Money::from_cents(7).floor_zero().cents(), 7);
    }

    #[test]
    fn test_sum_and_min() {
        let total: Money = [100, 250, 50].iter().map(|c| Money::from_cents(*c)).sum();
        assert_eq!(total.cents(), 400);
        assert_eq!(Money::from_cents(200).min(Money::from_cents(100)).cents(), 100);
    }

    #[test]
    fn test_checked_times() {
        assert_eq!(Money::from_rupees(40).checked_times(3), Some(Money::from_rupees(120)));
        assert_eq!(Money::from_cents(i64::MAX / 2).checked_times(3), None);
    }

    #[test]
    fn test_large_amount_does_not_overflow() {
        let big = Money::from_cents(i64::MAX / 2);
        assert!(big.percent(100).is_positive());
    }
}
