//! # Product Repository
//!
//! Catalog rows, list prices and dynamic price quotes.
//!
//! Stock is NOT written here; see [`StockLedger`](super::inventory::StockLedger).
//! The one exception is the initial count, which goes in with its own
//! `restock` history entry so the audit log replays from zero.
//!
//! ## Price Changes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  update_base_price(p, new)                                              │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │    UPDATE products SET updated_at = now  ← write lock first            │
//! │    SELECT old price                                                     │
//! │    UPDATE products SET base_price_cents = new                          │
//! │    new < old → SAVEPOINT: price_drop intents, flag subscribers         │
//! │    new > old → SAVEPOINT: re-arm subscribers                           │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{Local, NaiveDateTime, Utc};
use kirana_core::pricing::{quote_price, PriceQuote};
use kirana_core::validation::{
    validate_id, validate_non_negative, validate_price, validate_product_name, validate_quantity,
};
use kirana_core::{ChangeType, Money, NotificationKind, Product, DEFAULT_LOW_STOCK_THRESHOLD};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::alert::{notify_price_drop_in, rearm_price_drop_in};
use crate::repository::inventory::append_history_in;
use crate::repository::notification::log_fan_out;

pub(crate) const SELECT_PRODUCT: &str = r#"
    SELECT id, store_id, name, base_price_cents, stock, low_stock_threshold,
           is_active, created_at, updated_at
    FROM products
"#;

/// Input for [`ProductRepository::insert_product`].
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub store_id: String,
    pub name: String,
    pub base_price: Money,
    pub initial_stock: i64,
    pub low_stock_threshold: i64,
}

impl NewProduct {
    pub fn new(
        store_id: impl Into<String>,
        name: impl Into<String>,
        base_price: Money,
        initial_stock: i64,
    ) -> Self {
        NewProduct {
            store_id: store_id.into(),
            name: name.into(),
            base_price,
            initial_stock,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
        }
    }

    pub fn low_stock_threshold(mut self, threshold: i64) -> Self {
        self.low_stock_threshold = threshold;
        self
    }
}

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
/// let product = repo.insert_product(&NewProduct::new("store-1", "Amul Milk 1L", Money::from_rupees(68), 40)).await?;
/// let quote = repo.dynamic_price(&product.id, Some(6), None).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a product with its opening stock.
    pub async fn insert_product(&self, new: &NewProduct) -> DbResult<Product> {
        validate_id("store_id", &new.store_id)?;
        validate_product_name(&new.name)?;
        validate_price(new.base_price)?;
        validate_non_negative("initial_stock", new.initial_stock)?;
        validate_non_negative("low_stock_threshold", new.low_stock_threshold)?;

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            store_id: new.store_id.clone(),
            name: new.name.trim().to_string(),
            base_price_cents: new.base_price.cents(),
            stock: new.initial_stock,
            low_stock_threshold: new.low_stock_threshold,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %product.id, name = %product.name, "Inserting product");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (
                id, store_id, name, base_price_cents, stock, low_stock_threshold,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&product.id)
        .bind(&product.store_id)
        .bind(&product.name)
        .bind(product.base_price_cents)
        .bind(product.stock)
        .bind(product.low_stock_threshold)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await?;

        if product.stock > 0 {
            append_history_in(
                &mut tx,
                &product.id,
                0,
                product.stock,
                ChangeType::Restock,
                None,
                Some("opening stock"),
            )
            .await?;
        }

        tx.commit().await?;

        Ok(product)
    }

    /// Gets a product by ID.
    pub async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("{} WHERE id = ?1", SELECT_PRODUCT);
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Lists a store's active products by name.
    pub async fn list_by_store(&self, store_id: &str, limit: u32) -> DbResult<Vec<Product>> {
        let sql = format!(
            "{} WHERE store_id = ?1 AND is_active = 1 ORDER BY name LIMIT ?2",
            SELECT_PRODUCT
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(store_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Products with `0 < stock <= low_stock_threshold`, lowest stock first.
    pub async fn low_stock_products(
        &self,
        store_id: Option<&str>,
        limit: u32,
    ) -> DbResult<Vec<Product>> {
        let sql = format!(
            "{} WHERE is_active = 1 AND stock > 0 AND stock <= low_stock_threshold \
             AND (?1 IS NULL OR store_id = ?1) \
             ORDER BY stock ASC, name ASC LIMIT ?2",
            SELECT_PRODUCT
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(store_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Changes a product's list price (the external price-change event).
    ///
    /// A decrease notifies un-notified price-drop subscribers; an increase
    /// re-arms all of them.
    pub async fn update_base_price(&self, id: &str, new_price: Money) -> DbResult<Product> {
        validate_price(new_price)?;
        debug!(id = %id, new_price = %new_price, "Updating base price");

        let mut tx = self.pool.begin().await?;
        let product = touch_product_in(&mut tx, id).await?;
        let old_price = product.base_price();

        sqlx::query("UPDATE products SET base_price_cents = ?2 WHERE id = ?1")
            .bind(id)
            .bind(new_price.cents())
            .execute(&mut *tx)
            .await?;

        let updated = Product {
            base_price_cents: new_price.cents(),
            ..product
        };

        if new_price < old_price {
            let result = notify_price_drop_in(&mut tx, &updated, old_price, new_price).await;
            log_fan_out(result, NotificationKind::PriceDrop, id);
        } else if new_price > old_price {
            let result = rearm_price_drop_in(&mut tx, id).await;
            log_fan_out(result, NotificationKind::PriceDrop, id);
        }

        tx.commit().await?;

        info!(id = %id, old_price = %old_price, new_price = %new_price, "Base price updated");
        Ok(updated)
    }

    /// Quotes the dynamic unit price of a product.
    ///
    /// `quantity` defaults to 1 and `delivery_time` to the local time now.
    pub async fn dynamic_price(
        &self,
        id: &str,
        quantity: Option<i64>,
        delivery_time: Option<NaiveDateTime>,
    ) -> DbResult<PriceQuote> {
        let quantity = quantity.unwrap_or(1);
        validate_quantity(quantity)?;

        let product = self
            .get_product(id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| DbError::not_found("Product", id))?;

        let when = delivery_time.unwrap_or_else(|| Local::now().naive_local());
        Ok(quote_price(&product.id, product.base_price(), quantity, when))
    }

    /// Counts active products (for diagnostics and the seed binary).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Takes the write lock on a product row, then reads it.
///
/// First statement of every transaction that read-modify-writes a product.
pub(crate) async fn touch_product_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Product> {
    let result = sqlx::query("UPDATE products SET updated_at = ?2 WHERE id = ?1")
        .bind(id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", id));
    }

    let sql = format!("{} WHERE id = ?1", SELECT_PRODUCT);
    let product = sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(product)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::NaiveDate;

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_records_opening_stock() {
        let db = setup().await;
        let product = db
            .products()
            .insert_product(&NewProduct::new("store-1", "Tata Salt 1kg", Money::from_rupees(28), 12))
            .await
            .unwrap();

        let fetched = db.products().get_product(&product.id).await.unwrap().unwrap();
        assert_eq!(fetched.stock, 12);
        assert_eq!(fetched.low_stock_threshold, DEFAULT_LOW_STOCK_THRESHOLD);

        let history = db.stock().inventory_history(&product.id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].previous_quantity, 0);
        assert_eq!(history[0].new_quantity, 12);
    }

    #[tokio::test]
    async fn test_insert_rejects_bad_input() {
        let db = setup().await;
        let err = db
            .products()
            .insert_product(&NewProduct::new("store-1", "  ", Money::from_rupees(28), 1))
            .await
            .unwrap_err();
        assert!(err.is_rejection());

        let err = db
            .products()
            .insert_product(&NewProduct::new("store-1", "Salt", Money::from_cents(-1), 1))
            .await
            .unwrap_err();
        assert!(err.is_rejection());

        let err = db
            .products()
            .insert_product(&NewProduct::new("store-1", "Salt", Money::from_cents(i64::MAX / 2), 1))
            .await
            .unwrap_err();
        assert!(err.is_rejection());
        assert_eq!(db.products().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_low_stock_products() {
        let db = setup().await;
        let repo = db.products();
        repo.insert_product(&NewProduct::new("s1", "A", Money::from_rupees(10), 2)).await.unwrap();
        repo.insert_product(&NewProduct::new("s1", "B", Money::from_rupees(10), 50)).await.unwrap();
        repo.insert_product(&NewProduct::new("s1", "C", Money::from_rupees(10), 0)).await.unwrap();
        repo.insert_product(&NewProduct::new("s2", "D", Money::from_rupees(10), 4)).await.unwrap();

        let s1 = repo.low_stock_products(Some("s1"), 10).await.unwrap();
        assert_eq!(s1.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(), vec!["A"]);

        let all = repo.low_stock_products(None, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "A");
    }

    #[tokio::test]
    async fn test_dynamic_price() {
        let db = setup().await;
        let product = db
            .products()
            .insert_product(&NewProduct::new("s1", "Eggs x6", Money::from_rupees(60), 30))
            .await
            .unwrap();

        let early = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(7, 0, 0)
            .unwrap();
        let quote = db
            .products()
            .dynamic_price(&product.id, Some(5), Some(early))
            .await
            .unwrap();
        // 5% bulk + 10% early bird on ₹60
        assert_eq!(quote.final_price, Money::from_rupees(51));

        let again = db
            .products()
            .dynamic_price(&product.id, Some(5), Some(early))
            .await
            .unwrap();
        assert_eq!(quote, again);

        assert!(db.products().dynamic_price("missing", None, None).await.is_err());
    }

    #[tokio::test]
    async fn test_price_drop_notifies_once_and_rearms_on_increase() {
        let db = setup().await;
        let product = db
            .products()
            .insert_product(&NewProduct::new("s1", "Maggi 70g", Money::from_rupees(14), 30))
            .await
            .unwrap();
        db.alerts().subscribe_price_drop("u-1", &product.id).await.unwrap();

        db.products().update_base_price(&product.id, Money::from_rupees(12)).await.unwrap();
        assert_eq!(db.notifications().count_pending().await.unwrap(), 1);

        // Already notified: a second drop is quiet
        db.products().update_base_price(&product.id, Money::from_rupees(11)).await.unwrap();
        assert_eq!(db.notifications().count_pending().await.unwrap(), 1);

        // Increase re-arms, next drop notifies again
        db.products().update_base_price(&product.id, Money::from_rupees(15)).await.unwrap();
        let alerts = db.alerts().price_drop_alerts_for(&product.id).await.unwrap();
        assert!(!alerts[0].is_notified);
        db.products().update_base_price(&product.id, Money::from_rupees(13)).await.unwrap();
        assert_eq!(db.notifications().count_pending().await.unwrap(), 2);

        let pending = db.notifications().get_pending(10).await.unwrap();
        assert!(pending.iter().all(|n| n.kind == NotificationKind::PriceDrop));
        let stored = db.products().get_product(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.base_price(), Money::from_rupees(13));
    }
}
