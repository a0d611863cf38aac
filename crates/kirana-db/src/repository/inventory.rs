//! # Stock Ledger
//!
//! The only writer of `products.stock`. Every change appends exactly one
//! `inventory_history` row in the same transaction.
//!
//! ## adjust_stock
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    UPDATE products SET updated_at = ?       ← takes the write lock     │
//! │    SELECT product                           ← nobody can race us now   │
//! │    plan_adjustment(current, delta, type)    ← kirana-core rules        │
//! │         │                                                               │
//! │         ├── Err(InsufficientStock) → ROLLBACK, nothing changed         │
//! │         ▼                                                               │
//! │    UPDATE products SET stock = new                                      │
//! │    INSERT inventory_history (previous, new, type, order, notes)        │
//! │    low stock?     → SAVEPOINT low_stock fan-out                        │
//! │    back in stock? → SAVEPOINT back_in_stock fan-out                    │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use kirana_core::stock::plan_adjustment;
use kirana_core::{ChangeType, InventoryHistoryEntry, NotificationKind, StockLevel};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::alert::{notify_back_in_stock_in, notify_low_stock_in};
use crate::repository::notification::log_fan_out;
use crate::repository::product::touch_product_in;

/// Repository for stock mutations and the inventory audit log.
#[derive(Debug, Clone)]
pub struct StockLedger {
    pool: SqlitePool,
}

impl StockLedger {
    pub fn new(pool: SqlitePool) -> Self {
        StockLedger { pool }
    }

    /// Adjusts a product's stock by `delta`.
    ///
    /// ## Arguments
    /// * `delta` - Positive for restock/return, negative for sale
    /// * `change_type` - Why the stock moved
    /// * `order_id` - The order behind a sale or return
    /// * `notes` - Free text for the audit entry
    ///
    /// ## Errors
    /// `Rejected(InsufficientStock)` when a sale asks for more than is on the
    /// shelf. Adjustments clamp at zero instead.
    pub async fn adjust_stock(
        &self,
        product_id: &str,
        delta: i64,
        change_type: ChangeType,
        order_id: Option<&str>,
        notes: Option<&str>,
    ) -> DbResult<StockLevel> {
        let mut tx = self.pool.begin().await?;

        let level = match adjust_stock_in(&mut tx, product_id, delta, change_type, order_id, notes).await {
            Ok(level) => level,
            Err(e) => {
                if e.is_rejection() {
                    warn!(product_id = %product_id, delta, error = %e, "Stock adjustment rejected");
                }
                return Err(e);
            }
        };

        tx.commit().await?;

        info!(
            product_id = %product_id,
            delta,
            change_type = %change_type,
            new_quantity = level.new_quantity,
            "Stock adjusted"
        );
        Ok(level)
    }

    /// Audit log of a product, oldest first.
    pub async fn inventory_history(
        &self,
        product_id: &str,
        limit: u32,
    ) -> DbResult<Vec<InventoryHistoryEntry>> {
        let entries = sqlx::query_as::<_, InventoryHistoryEntry>(
            r#"
            SELECT id, product_id, previous_quantity, new_quantity, change_type,
                   order_id, notes, created_at
            FROM inventory_history
            WHERE product_id = ?1
            ORDER BY rowid ASC
            LIMIT ?2
            "#,
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

// =============================================================================
// In-Transaction Helpers
// =============================================================================

/// Stock adjustment on the caller's transaction. Checkout uses this directly.
pub(crate) async fn adjust_stock_in(
    conn: &mut SqliteConnection,
    product_id: &str,
    delta: i64,
    change_type: ChangeType,
    order_id: Option<&str>,
    notes: Option<&str>,
) -> DbResult<StockLevel> {
    debug!(product_id = %product_id, delta, change_type = %change_type, "Adjusting stock");

    let product = touch_product_in(&mut *conn, product_id).await?;
    let transition = plan_adjustment(
        &product.name,
        product.stock,
        delta,
        change_type,
        product.low_stock_threshold,
        notes,
    )?;

    sqlx::query("UPDATE products SET stock = ?2 WHERE id = ?1")
        .bind(product_id)
        .bind(transition.new_quantity)
        .execute(&mut *conn)
        .await?;

    append_history_in(
        &mut *conn,
        product_id,
        transition.previous_quantity,
        transition.new_quantity,
        change_type,
        order_id,
        transition.notes.as_deref(),
    )
    .await?;

    if transition.clamped {
        warn!(product_id = %product_id, delta, "Adjustment clamped at zero");
    }

    if transition.low_stock {
        let result = notify_low_stock_in(&mut *conn, &product, transition.new_quantity).await;
        log_fan_out(result, NotificationKind::LowStock, product_id);
    }
    if transition.back_in_stock {
        let result = notify_back_in_stock_in(&mut *conn, &product, transition.new_quantity).await;
        log_fan_out(result, NotificationKind::BackInStock, product_id);
    }

    Ok(StockLevel {
        new_quantity: transition.new_quantity,
        in_stock: transition.new_quantity > 0,
    })
}

/// Appends one audit entry.
pub(crate) async fn append_history_in(
    conn: &mut SqliteConnection,
    product_id: &str,
    previous_quantity: i64,
    new_quantity: i64,
    change_type: ChangeType,
    order_id: Option<&str>,
    notes: Option<&str>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO inventory_history (
            id, product_id, previous_quantity, new_quantity, change_type,
            order_id, notes, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(product_id)
    .bind(previous_quantity)
    .bind(new_quantity)
    .bind(change_type)
    .bind(order_id)
    .bind(notes)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
