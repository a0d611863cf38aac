//! # Wallet Ledger
//!
//! Per-user balance plus an append-only transaction log. The balance always
//! equals the sum of the user's transactions; [`WalletLedger::audit`]
//! checks it.
//!
//! ## Debit Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    UPDATE wallets SET balance_cents = balance_cents - :amount           │
//! │     WHERE user_id = :user AND balance_cents >= :amount                  │
//! │         │                                                               │
//! │         ├── 0 rows → re-read balance → InsufficientWalletBalance        │
//! │         │            { available, required }   ROLLBACK                 │
//! │         ▼                                                               │
//! │    INSERT wallet_transactions (amount = -:amount, order_id)            │
//! │    SAVEPOINT wallet_debit intent                                        │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two checkouts draining the same wallet both run that guarded UPDATE;
//! SQLite serializes them and the second sees the reduced balance.
//!
//! Loyalty points live on the same row and follow the same pattern.

use chrono::Utc;
use kirana_core::validation::validate_amount;
use kirana_core::{
    CoreError, Money, NotificationKind, ValidationError, Wallet, WalletAudit, WalletTransaction,
    WalletTransactionType,
};
use serde_json::json;
use sqlx::{Connection, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::notification::{enqueue_in, log_fan_out};

const SELECT_TRANSACTION: &str = r#"
    SELECT id, user_id, amount_cents, tx_type, description, order_id,
           transaction_id, gift_card_code, created_at
    FROM wallet_transactions
"#;

/// A committed wallet mutation and the balance it left behind.
#[derive(Debug, Clone)]
pub struct WalletUpdate {
    pub transaction: WalletTransaction,
    pub balance: Money,
}

/// One ledger line to append, before it has an id.
#[derive(Debug, Clone)]
pub(crate) struct LedgerEntry<'a> {
    pub tx_type: WalletTransactionType,
    pub description: String,
    pub order_id: Option<&'a str>,
    pub transaction_id: Option<&'a str>,
    pub gift_card_code: Option<&'a str>,
}

impl<'a> LedgerEntry<'a> {
    pub(crate) fn new(tx_type: WalletTransactionType, description: impl Into<String>) -> Self {
        LedgerEntry {
            tx_type,
            description: description.into(),
            order_id: None,
            transaction_id: None,
            gift_card_code: None,
        }
    }
}

/// Repository for wallet balances, transactions and loyalty points.
#[derive(Debug, Clone)]
pub struct WalletLedger {
    pool: SqlitePool,
}

impl WalletLedger {
    pub fn new(pool: SqlitePool) -> Self {
        WalletLedger { pool }
    }

    /// The wallet row, if the user ever had one.
    pub async fn get_wallet(&self, user_id: &str) -> DbResult<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>(
            "SELECT user_id, balance_cents, loyalty_points, updated_at FROM wallets WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(wallet)
    }

    /// Current balance. A user without a wallet has ₹0.00.
    pub async fn balance(&self, user_id: &str) -> DbResult<Money> {
        Ok(self
            .get_wallet(user_id)
            .await?
            .map(|w| w.balance())
            .unwrap_or_default())
    }

    pub async fn loyalty_points(&self, user_id: &str) -> DbResult<i64> {
        Ok(self
            .get_wallet(user_id)
            .await?
            .map(|w| w.loyalty_points)
            .unwrap_or(0))
    }

    /// Tops up a wallet.
    ///
    /// `transaction_id` is the gateway reference when the top-up was paid
    /// through the payment gateway.
    pub async fn add_money(
        &self,
        user_id: &str,
        amount: Money,
        transaction_id: Option<&str>,
    ) -> DbResult<WalletUpdate> {
        validate_amount("amount", amount)?;

        let mut entry = LedgerEntry::new(WalletTransactionType::TopUp, "Added money to wallet");
        entry.transaction_id = transaction_id;

        let mut tx = self.pool.begin().await?;
        let update = credit_in(&mut tx, user_id, amount, &entry).await?;
        tx.commit().await?;

        info!(user_id = %user_id, amount = %amount, balance = %update.balance, "Wallet topped up");
        Ok(update)
    }

    /// Pays for an order from the wallet.
    ///
    /// ## Errors
    /// `Rejected(InsufficientWalletBalance { available, required })` with no
    /// change to the balance or the log.
    pub async fn deduct_money(
        &self,
        user_id: &str,
        amount: Money,
        order_id: &str,
    ) -> DbResult<WalletUpdate> {
        let mut entry = LedgerEntry::new(
            WalletTransactionType::Purchase,
            format!("Payment for order {}", order_id),
        );
        entry.order_id = Some(order_id);

        let mut tx = self.pool.begin().await?;
        let update = match debit_in(&mut tx, user_id, amount, &entry).await {
            Ok(update) => update,
            Err(e) => {
                if e.is_rejection() {
                    warn!(user_id = %user_id, amount = %amount, error = %e, "Wallet debit rejected");
                }
                return Err(e);
            }
        };
        tx.commit().await?;

        info!(
            user_id = %user_id,
            amount = %amount,
            order_id = %order_id,
            balance = %update.balance,
            "Wallet debited"
        );
        Ok(update)
    }

    /// Most recent transactions first.
    pub async fn transactions(&self, user_id: &str, limit: u32) -> DbResult<Vec<WalletTransaction>> {
        let sql = format!(
            "{} WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            SELECT_TRANSACTION
        );
        let txs = sqlx::query_as::<_, WalletTransaction>(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(txs)
    }

    /// Compares the stored balance with the sum of the log.
    pub async fn audit(&self, user_id: &str) -> DbResult<WalletAudit> {
        let balance = self.balance(user_id).await?;
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM wallet_transactions WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let ledger_sum = Money::from_cents(sum);
        if balance != ledger_sum {
            warn!(user_id = %user_id, balance = %balance, ledger_sum = %ledger_sum, "Wallet out of balance");
        }

        Ok(WalletAudit {
            balance,
            ledger_sum,
            consistent: balance == ledger_sum,
        })
    }
}

// =============================================================================
// In-Transaction Helpers
// =============================================================================

/// Credits a wallet, creating it on first use, and appends the ledger line.
pub(crate) async fn credit_in(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: Money,
    entry: &LedgerEntry<'_>,
) -> DbResult<WalletUpdate> {
    validate_amount("amount", amount)?;
    debug!(user_id = %user_id, amount = %amount, tx_type = ?entry.tx_type, "Crediting wallet");

    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO wallets (user_id, balance_cents, loyalty_points, updated_at)
        VALUES (?1, ?2, 0, ?3)
        ON CONFLICT (user_id) DO UPDATE SET
            balance_cents = balance_cents + excluded.balance_cents,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(amount.cents())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let transaction = append_in(&mut *conn, user_id, amount, entry).await?;
    let balance = balance_in(&mut *conn, user_id).await?;

    let result = notify_wallet_in(&mut *conn, NotificationKind::WalletCredit, &transaction, balance).await;
    log_fan_out(result, NotificationKind::WalletCredit, user_id);

    Ok(WalletUpdate { transaction, balance })
}

/// Debits a wallet through the guarded update and appends the ledger line.
pub(crate) async fn debit_in(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: Money,
    entry: &LedgerEntry<'_>,
) -> DbResult<WalletUpdate> {
    validate_amount("amount", amount)?;
    debug!(user_id = %user_id, amount = %amount, "Debiting wallet");

    let result = sqlx::query(
        r#"
        UPDATE wallets
        SET balance_cents = balance_cents - ?2, updated_at = ?3
        WHERE user_id = ?1 AND balance_cents >= ?2
        "#,
    )
    .bind(user_id)
    .bind(amount.cents())
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let available = balance_in(&mut *conn, user_id).await?;
        return Err(CoreError::InsufficientWalletBalance {
            available,
            required: amount,
        }
        .into());
    }

    let transaction = append_in(&mut *conn, user_id, -amount, entry).await?;
    let balance = balance_in(&mut *conn, user_id).await?;

    let result = notify_wallet_in(&mut *conn, NotificationKind::WalletDebit, &transaction, balance).await;
    log_fan_out(result, NotificationKind::WalletDebit, user_id);

    Ok(WalletUpdate { transaction, balance })
}

/// Spends loyalty points. Rejects without change when the user has fewer.
pub(crate) async fn redeem_points_in(
    conn: &mut SqliteConnection,
    user_id: &str,
    points: i64,
) -> DbResult<()> {
    if points <= 0 {
        return Err(ValidationError::must_be_positive("loyalty_points").into());
    }

    let result = sqlx::query(
        r#"
        UPDATE wallets
        SET loyalty_points = loyalty_points - ?2, updated_at = ?3
        WHERE user_id = ?1 AND loyalty_points >= ?2
        "#,
    )
    .bind(user_id)
    .bind(points)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let available: Option<i64> =
            sqlx::query_scalar("SELECT loyalty_points FROM wallets WHERE user_id = ?1")
                .bind(user_id)
                .fetch_optional(&mut *conn)
                .await?;
        return Err(CoreError::InsufficientLoyaltyPoints {
            available: available.unwrap_or(0),
            requested: points,
        }
        .into());
    }

    Ok(())
}

/// Adds loyalty points (earned or refunded), creating the wallet if needed.
pub(crate) async fn credit_points_in(
    conn: &mut SqliteConnection,
    user_id: &str,
    points: i64,
) -> DbResult<()> {
    if points <= 0 {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO wallets (user_id, balance_cents, loyalty_points, updated_at)
        VALUES (?1, 0, ?2, ?3)
        ON CONFLICT (user_id) DO UPDATE SET
            loyalty_points = loyalty_points + excluded.loyalty_points,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(points)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn balance_in(conn: &mut SqliteConnection, user_id: &str) -> DbResult<Money> {
    let cents: Option<i64> = sqlx::query_scalar("SELECT balance_cents FROM wallets WHERE user_id = ?1")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(Money::from_cents(cents.unwrap_or(0)))
}

async fn append_in(
    conn: &mut SqliteConnection,
    user_id: &str,
    signed_amount: Money,
    entry: &LedgerEntry<'_>,
) -> DbResult<WalletTransaction> {
    let transaction = WalletTransaction {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        amount_cents: signed_amount.cents(),
        tx_type: entry.tx_type,
        description: entry.description.clone(),
        order_id: entry.order_id.map(str::to_string),
        transaction_id: entry.transaction_id.map(str::to_string),
        gift_card_code: entry.gift_card_code.map(str::to_string),
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO wallet_transactions (
            id, user_id, amount_cents, tx_type, description, order_id,
            transaction_id, gift_card_code, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&transaction.id)
    .bind(&transaction.user_id)
    .bind(transaction.amount_cents)
    .bind(transaction.tx_type)
    .bind(&transaction.description)
    .bind(&transaction.order_id)
    .bind(&transaction.transaction_id)
    .bind(&transaction.gift_card_code)
    .bind(transaction.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(transaction)
}

async fn notify_wallet_in(
    conn: &mut SqliteConnection,
    kind: NotificationKind,
    transaction: &WalletTransaction,
    balance: Money,
) -> DbResult<usize> {
    let mut sp = conn.begin().await?;

    let amount = transaction.amount();
    let message = if amount.is_negative() {
        format!("{} paid from your wallet", -amount)
    } else {
        format!("{} added to your wallet", amount)
    };
    let payload = json!({
        "transaction_id": transaction.id,
        "amount": amount.to_string(),
        "balance": balance.to_string(),
        "description": transaction.description,
        "message": message,
    });
    enqueue_in(&mut *sp, &transaction.user_id, kind, None, &payload).await?;

    sp.commit().await?;
    Ok(1)
}

// =============================================================================
// Unit Tests
// =============================================================================
