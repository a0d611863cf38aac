//! # Database Migrations
//!
//! The ledger schema, embedded from `migrations/sqlite/` at compile time.
//!
//! ## Schema Guards
//! The repositories check every rule before writing. The schema repeats the
//! counter rules as CHECK constraints, so a bad write fails inside SQLite
//! instead of landing:
//! ```text
//! ┌──────────────────────┬───────────────────────────────────────────────┐
//! │ table                │ CHECK                                         │
//! ├──────────────────────┼───────────────────────────────────────────────┤
//! │ products             │ stock >= 0, base_price_cents >= 0             │
//! │ inventory_history    │ previous/new quantity >= 0                    │
//! │ flash_sales          │ 0 <= sold_quantity <= max_quantity            │
//! │ offers               │ exactly one of percent / flat amount          │
//! │ wallets              │ balance_cents >= 0, loyalty_points >= 0       │
//! │ wallet_transactions  │ amount_cents <> 0                             │
//! │ gift_cards           │ 0 <= balance <= amount, redeemed iff 0        │
//! │ orders               │ status / payment enums                        │
//! └──────────────────────┴───────────────────────────────────────────────┘
//! ```
//!
//! New migrations go in `migrations/sqlite/` as `NNN_description.sql`.
//! Applied files are never edited; `sqlx` refuses a changed checksum.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies pending migrations in filename order. Safe to call on every start.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    debug!(embedded = MIGRATOR.migrations.len(), "Checking ledger schema");

    MIGRATOR.run(pool).await?;

    info!("Ledger schema up to date");
    Ok(())
}

/// `(embedded, applied)` migration counts, for health checks.
///
/// A database that was never migrated reports zero applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let applied: Option<i64> = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .ok();

    Ok((MIGRATOR.migrations.len(), applied.unwrap_or(0) as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_unmigrated_database_reports_zero() {
        let db = Database::new(DbConfig::in_memory().run_migrations(false))
            .await
            .unwrap();
        let (embedded, applied) = migration_status(db.pool()).await.unwrap();
        assert!(embedded >= 1);
        assert_eq!(applied, 0);

        run_migrations(db.pool()).await.unwrap();
        assert_eq!(migration_status(db.pool()).await.unwrap(), (embedded, embedded));
    }

    #[tokio::test]
    async fn test_schema_refuses_negative_balances() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let stock = sqlx::query(
            "INSERT INTO products (id, store_id, name, base_price_cents, stock, created_at, updated_at)
             VALUES ('p-1', 's-1', 'Salt', 2800, -1, datetime('now'), datetime('now'))",
        )
        .execute(db.pool())
        .await;
        assert!(stock.is_err());

        let wallet = sqlx::query(
            "INSERT INTO wallets (user_id, balance_cents, loyalty_points, updated_at)
             VALUES ('u-1', -100, 0, datetime('now'))",
        )
        .execute(db.pool())
        .await;
        assert!(wallet.is_err());

        sqlx::query(
            "INSERT INTO wallets (user_id, balance_cents, loyalty_points, updated_at)
             VALUES ('u-1', 0, 0, datetime('now'))",
        )
        .execute(db.pool())
        .await
        .unwrap();
    }
}
