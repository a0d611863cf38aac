//! # Alert Subscriptions
//!
//! Stock alerts and price-drop alerts, plus the fan-out that turns a ledger
//! event into notification intents for their subscribers.
//!
//! ## Stock Alert Lifecycle
//! ```text
//!   subscribe ──► is_notified = 0
//!                     │
//!                     │ stock drops into the low band
//!                     ▼
//!                 low_stock intent, is_notified = 1
//!                     │
//!                     │ further drops: nothing (already notified)
//!                     │ stock 0 → >0
//!                     ▼
//!                 back_in_stock intent, is_notified = 0   (re-armed)
//! ```
//!
//! Every fan-out runs inside a savepoint on the ledger's connection. The
//! caller logs a failure and carries on; see
//! [`log_fan_out`](super::notification::log_fan_out).

use chrono::Utc;
use kirana_core::{Money, NotificationKind, PriceDropAlert, Product, StockAlert};
use serde_json::json;
use sqlx::{Connection, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::notification::enqueue_in;

/// Repository for alert subscriptions.
#[derive(Debug, Clone)]
pub struct AlertRepository {
    pool: SqlitePool,
}

impl AlertRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AlertRepository { pool }
    }

    /// Subscribes a user to stock changes on a product. Idempotent.
    pub async fn subscribe_stock_alert(&self, user_id: &str, product_id: &str) -> DbResult<StockAlert> {
        debug!(user_id = %user_id, product_id = %product_id, "Subscribing stock alert");
        self.subscribe("stock_alerts", user_id, product_id).await?;

        let alert = sqlx::query_as::<_, StockAlert>(
            r#"
            SELECT id, user_id, product_id, is_notified, created_at
            FROM stock_alerts
            WHERE user_id = ?1 AND product_id = ?2
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(alert)
    }

    /// Removes a stock alert. Returns whether one existed.
    pub async fn unsubscribe_stock_alert(&self, user_id: &str, product_id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM stock_alerts WHERE user_id = ?1 AND product_id = ?2")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Subscribes a user to price drops on a product. Idempotent.
    pub async fn subscribe_price_drop(
        &self,
        user_id: &str,
        product_id: &str,
    ) -> DbResult<PriceDropAlert> {
        debug!(user_id = %user_id, product_id = %product_id, "Subscribing price-drop alert");
        self.subscribe("price_drop_alerts", user_id, product_id).await?;

        let alert = sqlx::query_as::<_, PriceDropAlert>(
            r#"
            SELECT id, user_id, product_id, is_notified, created_at
            FROM price_drop_alerts
            WHERE user_id = ?1 AND product_id = ?2
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(alert)
    }

    pub async fn unsubscribe_price_drop(&self, user_id: &str, product_id: &str) -> DbResult<bool> {
        let result =
            sqlx::query("DELETE FROM price_drop_alerts WHERE user_id = ?1 AND product_id = ?2")
                .bind(user_id)
                .bind(product_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists the stock alerts on a product, oldest first.
    pub async fn stock_alerts_for(&self, product_id: &str) -> DbResult<Vec<StockAlert>> {
        let alerts = sqlx::query_as::<_, StockAlert>(
            r#"
            SELECT id, user_id, product_id, is_notified, created_at
            FROM stock_alerts
            WHERE product_id = ?1
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(alerts)
    }

    /// Lists the price-drop alerts on a product, oldest first.
    pub async fn price_drop_alerts_for(&self, product_id: &str) -> DbResult<Vec<PriceDropAlert>> {
        let alerts = sqlx::query_as::<_, PriceDropAlert>(
            r#"
            SELECT id, user_id, product_id, is_notified, created_at
            FROM price_drop_alerts
            WHERE product_id = ?1
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(alerts)
    }

    async fn subscribe(&self, table: &str, user_id: &str, product_id: &str) -> DbResult<()> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(DbError::not_found("Product", product_id));
        }

        // `table` is one of two literals above, never user input.
        let sql = format!(
            "INSERT INTO {} (id, user_id, product_id, is_notified, created_at) \
             VALUES (?1, ?2, ?3, 0, ?4) \
             ON CONFLICT (user_id, product_id) DO NOTHING",
            table
        );
        sqlx::query(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(user_id)
            .bind(product_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// =============================================================================
// Fan-out (called from ledger transactions)
// =============================================================================

/// Low stock: notify un-notified subscribers once, then flag them.
pub(crate) async fn notify_low_stock_in(
    conn: &mut SqliteConnection,
    product: &Product,
    new_quantity: i64,
) -> DbResult<usize> {
    let mut sp = conn.begin().await?;

    let users: Vec<String> = sqlx::query_scalar(
        "SELECT user_id FROM stock_alerts WHERE product_id = ?1 AND is_notified = 0 \
         ORDER BY created_at ASC, rowid ASC",
    )
    .bind(&product.id)
    .fetch_all(&mut *sp)
    .await?;

    let payload = json!({
        "product_id": product.id,
        "product_name": product.name,
        "stock": new_quantity,
        "message": format!("Hurry! Only {} left of {}", new_quantity, product.name),
    });
    for user_id in &users {
        enqueue_in(&mut *sp, user_id, NotificationKind::LowStock, Some(&product.id), &payload).await?;
    }

    sqlx::query("UPDATE stock_alerts SET is_notified = 1 WHERE product_id = ?1 AND is_notified = 0")
        .bind(&product.id)
        .execute(&mut *sp)
        .await?;

    sp.commit().await?;
    Ok(users.len())
}

/// Back in stock: notify every subscriber and re-arm all of them.
pub(crate) async fn notify_back_in_stock_in(
    conn: &mut SqliteConnection,
    product: &Product,
    new_quantity: i64,
) -> DbResult<usize> {
    let mut sp = conn.begin().await?;

    let users: Vec<String> = sqlx::query_scalar(
        "SELECT user_id FROM stock_alerts WHERE product_id = ?1 ORDER BY created_at ASC, rowid ASC",
    )
    .bind(&product.id)
    .fetch_all(&mut *sp)
    .await?;

    let payload = json!({
        "product_id": product.id,
        "product_name": product.name,
        "stock": new_quantity,
        "message": format!("{} is back in stock", product.name),
    });
    for user_id in &users {
        enqueue_in(&mut *sp, user_id, NotificationKind::BackInStock, Some(&product.id), &payload)
            .await?;
    }

    sqlx::query("UPDATE stock_alerts SET is_notified = 0 WHERE product_id = ?1")
        .bind(&product.id)
        .execute(&mut *sp)
        .await?;

    sp.commit().await?;
    Ok(users.len())
}

/// Price drop: notify un-notified subscribers, then flag them.
pub(crate) async fn notify_price_drop_in(
    conn: &mut SqliteConnection,
    product: &Product,
    old_price: Money,
    new_price: Money,
) -> DbResult<usize> {
    let mut sp = conn.begin().await?;

    let users: Vec<String> = sqlx::query_scalar(
        "SELECT user_id FROM price_drop_alerts WHERE product_id = ?1 AND is_notified = 0 \
         ORDER BY created_at ASC, rowid ASC",
    )
    .bind(&product.id)
    .fetch_all(&mut *sp)
    .await?;

    let payload = json!({
        "product_id": product.id,
        "product_name": product.name,
        "old_price": old_price.to_string(),
        "new_price": new_price.to_string(),
        "message": format!("{} is now {} (was {})", product.name, new_price, old_price),
    });
    for user_id in &users {
        enqueue_in(&mut *sp, user_id, NotificationKind::PriceDrop, Some(&product.id), &payload).await?;
    }

    sqlx::query(
        "UPDATE price_drop_alerts SET is_notified = 1 WHERE product_id = ?1 AND is_notified = 0",
    )
    .bind(&product.id)
    .execute(&mut *sp)
    .await?;

    sp.commit().await?;
    Ok(users.len())
}

/// A price increase re-arms every price-drop subscriber.
pub(crate) async fn rearm_price_drop_in(
    conn: &mut SqliteConnection,
    product_id: &str,
) -> DbResult<usize> {
    let mut sp = conn.begin().await?;

    let result = sqlx::query("UPDATE price_drop_alerts SET is_notified = 0 WHERE product_id = ?1")
        .bind(product_id)
        .execute(&mut *sp)
        .await?;

    sp.commit().await?;
    Ok(result.rows_affected() as usize)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use crate::repository::product::NewProduct;
    use crate::DbError;
    use kirana_core::Money;

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .insert_product(&NewProduct::new("store-1", "Parle-G 250g", Money::from_rupees(25), 10))
            .await
            .unwrap();

        let first = db.alerts().subscribe_stock_alert("u-1", &product.id).await.unwrap();
        let second = db.alerts().subscribe_stock_alert("u-1", &product.id).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(!first.is_notified);
        assert_eq!(db.alerts().stock_alerts_for(&product.id).await.unwrap().len(), 1);

        assert!(db.alerts().unsubscribe_stock_alert("u-1", &product.id).await.unwrap());
        assert!(!db.alerts().unsubscribe_stock_alert("u-1", &product.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_subscribe_unknown_product() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.alerts().subscribe_price_drop("u-1", "missing").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
