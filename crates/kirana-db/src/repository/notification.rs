//! # Notification Outbox
//!
//! Notification intents written by the ledgers, drained by kirana-dispatch.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  LEDGER OPERATION (e.g. adjust_stock 3 → 2, threshold 5)               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   LEDGER TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. UPDATE products SET stock = 2 WHERE id = ?                  │   │
//! │  │  2. INSERT INTO inventory_history ...                           │   │
//! │  │                                                                 │   │
//! │  │  ┌───────────────── SAVEPOINT ──────────────────────────────┐  │   │
//! │  │  │ 3. INSERT INTO notification_outbox (kind = 'low_stock')  │  │   │
//! │  │  │ 4. UPDATE stock_alerts SET is_notified = 1               │  │   │
//! │  │  └──────────────── fails? roll back to here, log, go on ────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← the stock change never depends on the notification          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            NOTIFICATION DISPATCHER (kirana-dispatch)            │   │
//! │  │                                                                 │   │
//! │  │  1. SELECT * FROM notification_outbox                           │   │
//! │  │     WHERE delivered_at IS NULL AND attempts < max               │   │
//! │  │  2. For each intent:                                            │   │
//! │  │     a. Hand to the push transport                               │   │
//! │  │     b. On success: delivered_at = NOW()                         │   │
//! │  │     c. On failure: attempts += 1, last_error = ?                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{Duration, Utc};
use kirana_core::{NotificationIntent, NotificationKind};
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::DbResult;

const SELECT_INTENT: &str = r#"
    SELECT id, user_id, kind, product_id, payload, attempts, last_error,
           created_at, attempted_at, delivered_at
    FROM notification_outbox
"#;

/// Repository for notification outbox operations.
#[derive(Debug, Clone)]
pub struct NotificationOutbox {
    pool: SqlitePool,
}

impl NotificationOutbox {
    /// Creates a new NotificationOutbox.
    pub fn new(pool: SqlitePool) -> Self {
        NotificationOutbox { pool }
    }

    /// Queues a notification outside any ledger operation.
    ///
    /// Ledgers do not call this; they enqueue on their own connection so the
    /// intent commits with the mutation that caused it.
    pub async fn enqueue(
        &self,
        user_id: &str,
        kind: NotificationKind,
        product_id: Option<&str>,
        payload: &Value,
    ) -> DbResult<NotificationIntent> {
        let mut conn = self.pool.acquire().await?;
        enqueue_in(&mut conn, user_id, kind, product_id, payload).await
    }

    /// Gets undelivered intents, oldest first.
    pub async fn get_pending(&self, limit: u32) -> DbResult<Vec<NotificationIntent>> {
        let sql = format!(
            "{} WHERE delivered_at IS NULL ORDER BY created_at ASC, rowid ASC LIMIT ?1",
            SELECT_INTENT
        );
        let intents = sqlx::query_as::<_, NotificationIntent>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(intents)
    }

    /// Gets undelivered intents that still have attempts left, oldest first.
    pub async fn get_retryable(
        &self,
        limit: u32,
        max_attempts: u32,
    ) -> DbResult<Vec<NotificationIntent>> {
        let sql = format!(
            "{} WHERE delivered_at IS NULL AND attempts < ?2 \
             ORDER BY created_at ASC, rowid ASC LIMIT ?1",
            SELECT_INTENT
        );
        let intents = sqlx::query_as::<_, NotificationIntent>(&sql)
            .bind(limit)
            .bind(max_attempts)
            .fetch_all(&self.pool)
            .await?;

        Ok(intents)
    }

    /// Marks an intent as delivered.
    pub async fn mark_delivered(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE notification_outbox SET
                delivered_at = ?2,
                attempted_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a delivery failure.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE notification_outbox SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counts undelivered intents.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notification_outbox WHERE delivered_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Counts undelivered intents that used up their attempts.
    pub async fn count_exhausted(&self, max_attempts: u32) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notification_outbox WHERE delivered_at IS NULL AND attempts >= ?1",
        )
        .bind(max_attempts)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Deletes intents delivered more than `days_old` days ago.
    ///
    /// ## Returns
    /// Number of deleted intents.
    pub async fn cleanup_delivered(&self, days_old: u32) -> DbResult<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(days_old));

        let result = sqlx::query(
            r#"
            DELETE FROM notification_outbox
            WHERE delivered_at IS NOT NULL
            AND delivered_at < ?1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// In-Transaction Helpers
// =============================================================================

/// Inserts an intent on the caller's connection (and so in its transaction).
pub(crate) async fn enqueue_in(
    conn: &mut SqliteConnection,
    user_id: &str,
    kind: NotificationKind,
    product_id: Option<&str>,
    payload: &Value,
) -> DbResult<NotificationIntent> {
    let intent = NotificationIntent {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        kind,
        product_id: product_id.map(str::to_string),
        payload: payload.to_string(),
        attempts: 0,
        last_error: None,
        created_at: Utc::now(),
        attempted_at: None,
        delivered_at: None,
    };

    debug!(user_id = %user_id, kind = %kind, "Enqueuing notification");

    sqlx::query(
        r#"
        INSERT INTO notification_outbox (
            id, user_id, kind, product_id, payload,
            attempts, last_error, created_at, attempted_at, delivered_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&intent.id)
    .bind(&intent.user_id)
    .bind(intent.kind)
    .bind(&intent.product_id)
    .bind(&intent.payload)
    .bind(intent.attempts)
    .bind(&intent.last_error)
    .bind(intent.created_at)
    .bind(intent.attempted_at)
    .bind(intent.delivered_at)
    .execute(&mut *conn)
    .await?;

    Ok(intent)
}

/// Logs the outcome of a savepoint-wrapped fan-out.
///
/// A failed fan-out has already rolled back to its savepoint; the ledger
/// mutation around it goes ahead.
pub(crate) fn log_fan_out(result: DbResult<usize>, kind: NotificationKind, subject: &str) {
    match result {
        Ok(0) => {}
        Ok(count) => debug!(kind = %kind, subject = %subject, count, "Notifications queued"),
        Err(e) => warn!(
            kind = %kind,
            subject = %subject,
            error = %e,
            "Notification fan-out failed; ledger change kept"
        ),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use serde_json::json;

    async fn outbox() -> NotificationOutbox {
        Database::new(DbConfig::in_memory()).await.unwrap().notifications()
    }

    #[tokio::test]
    async fn test_enqueue_and_deliver() {
        let outbox = outbox().await;
        let intent = outbox
            .enqueue("u-1", NotificationKind::WalletCredit, None, &json!({ "amount": "₹50.00" }))
            .await
            .unwrap();
        assert_eq!(outbox.count_pending().await.unwrap(), 1);

        let pending = outbox.get_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, intent.id);
        assert_eq!(pending[0].kind, NotificationKind::WalletCredit);

        outbox.mark_delivered(&intent.id).await.unwrap();
        assert_eq!(outbox.count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_intents_run_out_of_attempts() {
        let outbox = outbox().await;
        let intent = outbox
            .enqueue("u-1", NotificationKind::PriceDrop, None, &json!({}))
            .await
            .unwrap();

        outbox.mark_failed(&intent.id, "push gateway down").await.unwrap();
        outbox.mark_failed(&intent.id, "push gateway down").await.unwrap();

        assert_eq!(outbox.get_retryable(10, 3).await.unwrap().len(), 1);
        assert!(outbox.get_retryable(10, 2).await.unwrap().is_empty());
        assert_eq!(outbox.count_exhausted(2).await.unwrap(), 1);

        let pending = outbox.get_pending(10).await.unwrap();
        assert_eq!(pending[0].attempts, 2);
        assert_eq!(pending[0].last_error.as_deref(), Some("push gateway down"));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_and_pending() {
        let outbox = outbox().await;
        let a = outbox
            .enqueue("u-1", NotificationKind::LowStock, None, &json!({}))
            .await
            .unwrap();
        outbox
            .enqueue("u-2", NotificationKind::LowStock, None, &json!({}))
            .await
            .unwrap();
        outbox.mark_delivered(&a.id).await.unwrap();

        assert_eq!(outbox.cleanup_delivered(7).await.unwrap(), 0);
        assert_eq!(outbox.count_pending().await.unwrap(), 1);
    }
}
