//! # Validation Module
//!
//! Input checks that run before any ledger is touched.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Storefront (TypeScript)                                      │
//! │  └── Empty fields, obvious typos                                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Amounts must be positive                                          │
//! │  ├── Quantities within 1..=MAX_ITEM_QUANTITY                           │
//! │  └── Coupon codes normalised to upper-case                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite CHECK constraints                                     │
//! │  ├── stock >= 0, balance_cents >= 0                                    │
//! │  └── sold_quantity <= max_quantity                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::{MAX_AMOUNT, MAX_ITEM_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an identifier supplied by an external collaborator (user, store).
pub fn validate_id(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > 64 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 64,
        });
    }

    Ok(())
}

/// Validates a product name (1-200 characters after trimming).
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates and normalises a coupon code.
///
/// ## Rules
/// - 3 to 20 characters after trimming
/// - Letters and digits only
///
/// ## Returns
/// The upper-cased code, which is how codes are stored.
///
/// ```rust
/// use kirana_core::validation::normalize_coupon_code;
///
/// assert_eq!(normalize_coupon_code(" welcome20 ").unwrap(), "WELCOME20");
/// assert!(normalize_coupon_code("W-20").is_err());
/// ```
pub fn normalize_coupon_code(code: &str) -> ValidationResult<String> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "code".to_string(),
        });
    }

    if code.len() < 3 || code.len() > 20 {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must be 3 to 20 characters".to_string(),
        });
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must contain only letters and digits".to_string(),
        });
    }

    Ok(code.to_ascii_uppercase())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity: `1..=MAX_ITEM_QUANTITY`.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::must_be_positive("quantity"));
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a list price: `0..=MAX_AMOUNT`. Zero is allowed (free samples).
pub fn validate_price(price: Money) -> ValidationResult<()> {
    if price.is_negative() || price > MAX_AMOUNT {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: MAX_AMOUNT.cents(),
        });
    }

    Ok(())
}

/// Validates a monetary amount that must be strictly positive
/// (top-ups, debits, gift-card face values, redemptions), capped at
/// `MAX_AMOUNT`.
pub fn validate_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::must_be_positive(field));
    }

    if amount > MAX_AMOUNT {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: MAX_AMOUNT.cents(),
        });
    }

    Ok(())
}

/// Validates a discount percentage: `1..=100`.
pub fn validate_discount_percent(percent: u32) -> ValidationResult<()> {
    if percent == 0 || percent > 100 {
        return Err(ValidationError::OutOfRange {
            field: "discount_percent".to_string(),
            min: 1,
            max: 100,
        });
    }

    Ok(())
}

/// Validates a delivery tip: `0..=max_tip`.
pub fn validate_tip(tip: Money, max_tip: Money) -> ValidationResult<()> {
    if tip.is_negative() || tip > max_tip {
        return Err(ValidationError::OutOfRange {
            field: "tip".to_string(),
            min: 0,
            max: max_tip.cents(),
        });
    }

    Ok(())
}

/// Validates a stock threshold or an initial stock count.
pub fn validate_non_negative(field: &str, value: i64) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-3).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_coupon_code_normalisation() {
        assert_eq!(normalize_coupon_code("Welcome20").unwrap(), "WELCOME20");
        assert!(normalize_coupon_code("").is_err());
        assert!(normalize_coupon_code("AB").is_err());
        assert!(normalize_coupon_code("SAVE 20").is_err());
        assert!(normalize_coupon_code(&"A".repeat(21)).is_err());
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount("amount", Money::from_cents(1)).is_ok());
        let err = validate_amount("amount", Money::zero()).unwrap_err();
        assert_eq!(err.to_string(), "amount must be positive");

        assert!(validate_amount("amount", MAX_AMOUNT).is_ok());
        let err = validate_amount("amount", MAX_AMOUNT + Money::from_cents(1)).unwrap_err();
        assert_eq!(err.to_string(), "amount must be between 1 and 10000000000");
    }

    #[test]
    fn test_validate_price() {
        assert!(validate_price(Money::zero()).is_ok());
        assert!(validate_price(MAX_AMOUNT).is_ok());
        assert!(validate_price(Money::from_cents(-1)).is_err());
        assert!(validate_price(Money::from_cents(i64::MAX / 2)).is_err());
    }

    #[test]
    fn test_validate_tip() {
        let max = Money::from_rupees(200);
        assert!(validate_tip(Money::zero(), max).is_ok());
        assert!(validate_tip(max, max).is_ok());
        assert!(validate_tip(Money::from_rupees(201), max).is_err());
        assert!(validate_tip(Money::from_cents(-1), max).is_err());
    }

    #[test]
    fn test_validate_discount_percent() {
        assert!(validate_discount_percent(20).is_ok());
        assert!(validate_discount_percent(100).is_ok());
        assert!(validate_discount_percent(0).is_err());
        assert!(validate_discount_percent(101).is_err());
    }

    #[test]
    fn test_validate_id_and_name() {
        assert!(validate_id("user_id", "u-1").is_ok());
        assert!(validate_id("user_id", "  ").is_err());
        assert!(validate_product_name("Amul Milk 1L").is_ok());
        assert!(validate_product_name(&"x".repeat(201)).is_err());
    }
}
