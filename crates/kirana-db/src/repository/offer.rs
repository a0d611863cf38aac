//! # Offer Repository
//!
//! Stores offers and validates coupon codes against an order.
//!
//! Codes are stored upper-case; lookups upper-case the input, so
//! `welcome20`, `Welcome20` and `WELCOME20` are the same coupon. The rules
//! themselves live in [`kirana_core::offer::evaluate_coupon`]; this module
//! only fetches the row and the clock.

use chrono::{DateTime, Utc};
use kirana_core::offer::{evaluate_coupon, CouponValidation};
use kirana_core::validation::{
    normalize_coupon_code, validate_amount, validate_discount_percent, validate_non_negative,
};
use kirana_core::{Money, Offer, OfferType, ValidationError};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};

const SELECT_OFFER: &str = r#"
    SELECT id, code, title, discount_percent, discount_amount_cents,
           min_order_amount_cents, max_discount_cents, offer_type, store_id,
           valid_from, valid_until, is_active, created_at
    FROM offers
"#;

/// How much an offer takes off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewDiscount {
    Percent { percent: u32, max_discount: Option<Money> },
    Flat(Money),
}

/// Input for [`OfferRepository::create_offer`].
#[derive(Debug, Clone)]
pub struct NewOffer {
    /// `None` for automatic promos with no code.
    pub code: Option<String>,
    pub title: String,
    pub discount: NewDiscount,
    pub min_order_amount: Money,
    pub offer_type: OfferType,
    pub store_id: Option<String>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

/// Repository for offers and coupons.
#[derive(Debug, Clone)]
pub struct OfferRepository {
    pool: SqlitePool,
}

impl OfferRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OfferRepository { pool }
    }

    /// Creates an offer.
    ///
    /// ## Errors
    /// * `UniqueViolation` if the code is taken
    /// * `Rejected(Validation)` for a malformed code, a percent outside
    ///   1..=100, a non-positive flat amount or an empty window
    pub async fn create_offer(&self, new: &NewOffer) -> DbResult<Offer> {
        let code = new.code.as_deref().map(normalize_coupon_code).transpose()?;

        if new.title.trim().is_empty() {
            return Err(ValidationError::Required { field: "title".to_string() }.into());
        }
        validate_non_negative("min_order_amount", new.min_order_amount.cents())?;
        if new.valid_from >= new.valid_until {
            return Err(ValidationError::InvalidFormat {
                field: "valid_until".to_string(),
                reason: "must be after valid_from".to_string(),
            }
            .into());
        }

        let (discount_percent, discount_amount_cents, max_discount_cents) = match new.discount {
            NewDiscount::Percent { percent, max_discount } => {
                validate_discount_percent(percent)?;
                if let Some(cap) = max_discount {
                    validate_amount("max_discount", cap)?;
                }
                (Some(percent), None, max_discount.map(|m| m.cents()))
            }
            NewDiscount::Flat(amount) => {
                validate_amount("discount_amount", amount)?;
                (None, Some(amount.cents()), None)
            }
        };

        let offer = Offer {
            id: Uuid::new_v4().to_string(),
            code,
            title: new.title.trim().to_string(),
            discount_percent,
            discount_amount_cents,
            min_order_amount_cents: new.min_order_amount.cents(),
            max_discount_cents,
            offer_type: new.offer_type,
            store_id: new.store_id.clone(),
            valid_from: new.valid_from,
            valid_until: new.valid_until,
            is_active: true,
            created_at: Utc::now(),
        };

        debug!(id = %offer.id, code = ?offer.code, "Creating offer");

        sqlx::query(
            r#"
            INSERT INTO offers (
                id, code, title, discount_percent, discount_amount_cents,
                min_order_amount_cents, max_discount_cents, offer_type, store_id,
                valid_from, valid_until, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&offer.id)
        .bind(&offer.code)
        .bind(&offer.title)
        .bind(offer.discount_percent)
        .bind(offer.discount_amount_cents)
        .bind(offer.min_order_amount_cents)
        .bind(offer.max_discount_cents)
        .bind(offer.offer_type)
        .bind(&offer.store_id)
        .bind(offer.valid_from)
        .bind(offer.valid_until)
        .bind(offer.is_active)
        .bind(offer.created_at)
        .execute(&self.pool)
        .await?;

        info!(id = %offer.id, code = ?offer.code, "Offer created");
        Ok(offer)
    }

    /// Looks an offer up by code, ignoring case.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Offer>> {
        let mut conn = self.pool.acquire().await?;
        get_by_code_in(&mut conn, code).await
    }

    /// Active offers valid at `now`, optionally narrowed to those usable in
    /// one store (store-scoped to it, or unscoped).
    pub async fn list_active(
        &self,
        store_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<Vec<Offer>> {
        let sql = format!(
            "{} WHERE is_active = 1 AND valid_from <= ?1 AND valid_until >= ?1 \
             AND (?2 IS NULL OR store_id IS NULL OR store_id = ?2) \
             ORDER BY created_at ASC, rowid ASC",
            SELECT_OFFER
        );
        let offers = sqlx::query_as::<_, Offer>(&sql)
            .bind(now)
            .bind(store_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(offers)
    }

    /// Validates a coupon against an order.
    ///
    /// Rejections come back as `valid: false` with a message; only storage
    /// failures are errors.
    pub async fn validate_coupon(
        &self,
        code: &str,
        store_id: Option<&str>,
        order_amount: Money,
    ) -> DbResult<CouponValidation> {
        let offer = self.get_by_code(code).await?;
        let result = evaluate_coupon(offer.as_ref(), store_id, order_amount, Utc::now());

        debug!(
            code = %code,
            valid = result.valid,
            discount = %result.discount,
            "Coupon validated"
        );
        Ok(result)
    }

    /// Deactivates an offer. Existing orders keep their discount.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE offers SET is_active = 0 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Offer", id));
        }

        info!(id = %id, "Offer deactivated");
        Ok(())
    }
}

/// Code lookup on the caller's connection. A code that cannot be a coupon
/// is simply not found.
pub(crate) async fn get_by_code_in(
    conn: &mut SqliteConnection,
    code: &str,
) -> DbResult<Option<Offer>> {
    let Ok(code) = normalize_coupon_code(code) else {
        return Ok(None);
    };

    let sql = format!("{} WHERE code = ?1", SELECT_OFFER);
    let offer = sqlx::query_as::<_, Offer>(&sql)
        .bind(code)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(offer)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;
    use chrono::Duration;

    fn welcome20() -> NewOffer {
        let now = Utc::now();
        NewOffer {
            code: Some("welcome20".to_string()),
            title: "20% off your first order".to_string(),
            discount: NewDiscount::Percent {
                percent: 20,
                max_discount: Some(Money::from_rupees(100)),
            },
            min_order_amount: Money::from_rupees(299),
            offer_type: OfferType::SiteWide,
            store_id: None,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(30),
        }
    }

    #[tokio::test]
    async fn test_welcome20_caps_at_max_discount() {
        let db = memory_db().await;
        let offer = db.offers().create_offer(&welcome20()).await.unwrap();
        assert_eq!(offer.code.as_deref(), Some("WELCOME20"));

        let result = db
            .offers()
            .validate_coupon("Welcome20", None, Money::from_rupees(1000))
            .await
            .unwrap();
        assert!(result.valid);
        assert_eq!(result.discount, Money::from_rupees(100));
        assert_eq!(result.message, "Coupon applied! You saved ₹100.00");

        // Same input, same answer
        let again = db
            .offers()
            .validate_coupon("WELCOME20", None, Money::from_rupees(1000))
            .await
            .unwrap();
        assert_eq!(again.discount, result.discount);
    }

    #[tokio::test]
    async fn test_rejections_are_results() {
        let db = memory_db().await;
        db.offers().create_offer(&welcome20()).await.unwrap();

        let short = db
            .offers()
            .validate_coupon("WELCOME20", None, Money::from_rupees(200))
            .await
            .unwrap();
        assert!(!short.valid);
        assert_eq!(short.discount, Money::zero());
        assert_eq!(short.message, "Minimum order amount of ₹299.00 required");

        let unknown = db
            .offers()
            .validate_coupon("NOPE", None, Money::from_rupees(1000))
            .await
            .unwrap();
        assert!(!unknown.valid);
        assert_eq!(unknown.message, "Invalid coupon code");

        let garbage = db
            .offers()
            .validate_coupon("!!", None, Money::from_rupees(1000))
            .await
            .unwrap();
        assert!(!garbage.valid);
    }

    #[tokio::test]
    async fn test_store_scope() {
        let db = memory_db().await;
        let scoped = NewOffer {
            code: Some("SHOP50".to_string()),
            discount: NewDiscount::Flat(Money::from_rupees(50)),
            offer_type: OfferType::ShopDiscount,
            store_id: Some("store-1".to_string()),
            ..welcome20()
        };
        db.offers().create_offer(&scoped).await.unwrap();

        let other = db
            .offers()
            .validate_coupon("SHOP50", Some("store-2"), Money::from_rupees(500))
            .await
            .unwrap();
        assert!(!other.valid);
        assert_eq!(other.message, "This coupon is not valid for this store");

        let home = db
            .offers()
            .validate_coupon("SHOP50", Some("store-1"), Money::from_rupees(500))
            .await
            .unwrap();
        assert!(home.valid);
        assert_eq!(home.discount, Money::from_rupees(50));

        assert_eq!(db.offers().list_active(Some("store-1"), Utc::now()).await.unwrap().len(), 1);
        assert!(db.offers().list_active(Some("store-2"), Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates_and_bad_input() {
        let db = memory_db().await;
        db.offers().create_offer(&welcome20()).await.unwrap();

        let err = db.offers().create_offer(&welcome20()).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        let bad_pct = NewOffer {
            code: Some("BIG".to_string()),
            discount: NewDiscount::Percent { percent: 150, max_discount: None },
            ..welcome20()
        };
        assert!(db.offers().create_offer(&bad_pct).await.unwrap_err().is_rejection());

        let bad_code = NewOffer {
            code: Some("NO SPACES".to_string()),
            ..welcome20()
        };
        assert!(db.offers().create_offer(&bad_code).await.unwrap_err().is_rejection());
    }

    #[tokio::test]
    async fn test_deactivated_offer_is_rejected() {
        let db = memory_db().await;
        let offer = db.offers().create_offer(&welcome20()).await.unwrap();
        db.offers().deactivate(&offer.id).await.unwrap();

        let result = db
            .offers()
            .validate_coupon("WELCOME20", None, Money::from_rupees(1000))
            .await
            .unwrap();
        assert!(!result.valid);
        assert_eq!(result.message, "This coupon is no longer active");
        assert!(db.offers().list_active(None, Utc::now()).await.unwrap().is_empty());
    }
}
