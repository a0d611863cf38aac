//! # Gift Card Ledger
//!
//! Gift cards are redeemed into the wallet. One redemption is one
//! transaction:
//!
//! ```text
//! BEGIN
//!   UPDATE gift_cards SET updated_at = now WHERE code = ?   ← write lock
//!   SELECT card; check active, not expired, amount <= balance
//!   UPDATE gift_cards SET balance_cents = balance - amount,
//!                         status = CASE balance - amount WHEN 0 THEN 'redeemed' ...
//!   wallet credit + wallet_transactions row (gift_card_code = code)
//! COMMIT
//! ```
//!
//! Because every credit carries the card's code,
//! `balance + redeemed_total(code) == amount` can be checked at any time.

use chrono::{DateTime, Utc};
use kirana_core::validation::validate_amount;
use kirana_core::{
    CoreError, CoreResult, GiftCard, GiftCardRedemption, GiftCardStatus, Money,
    WalletTransactionType,
};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::wallet::{credit_in, LedgerEntry};

const SELECT_GIFT_CARD: &str = r#"
    SELECT id, code, amount_cents, balance_cents, status, expires_at, created_at, updated_at
    FROM gift_cards
"#;

/// Repository for gift cards.
#[derive(Debug, Clone)]
pub struct GiftCardLedger {
    pool: SqlitePool,
}

impl GiftCardLedger {
    pub fn new(pool: SqlitePool) -> Self {
        GiftCardLedger { pool }
    }

    /// Issues a new card with a fresh `GC-XXXXXXXXXXXX` code.
    pub async fn issue(&self, amount: Money, expires_at: DateTime<Utc>) -> DbResult<GiftCard> {
        validate_amount("amount", amount)?;

        let now = Utc::now();
        let card = GiftCard {
            id: Uuid::new_v4().to_string(),
            code: generate_code(),
            amount_cents: amount.cents(),
            balance_cents: amount.cents(),
            status: GiftCardStatus::Active,
            expires_at,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %card.id, amount = %amount, "Issuing gift card");

        sqlx::query(
            r#"
            INSERT INTO gift_cards (
                id, code, amount_cents, balance_cents, status, expires_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&card.id)
        .bind(&card.code)
        .bind(card.amount_cents)
        .bind(card.balance_cents)
        .bind(card.status)
        .bind(card.expires_at)
        .bind(card.created_at)
        .bind(card.updated_at)
        .execute(&self.pool)
        .await?;

        info!(code = %card.code, amount = %amount, expires_at = %expires_at, "Gift card issued");
        Ok(card)
    }

    /// Looks a card up by code, ignoring case.
    pub async fn get(&self, code: &str) -> DbResult<Option<GiftCard>> {
        let sql = format!("{} WHERE code = ?1", SELECT_GIFT_CARD);
        let card = sqlx::query_as::<_, GiftCard>(&sql)
            .bind(normalize_code(code))
            .fetch_optional(&self.pool)
            .await?;

        Ok(card)
    }

    /// Redeems a card into `user_id`'s wallet.
    ///
    /// `amount` defaults to the whole remaining balance.
    ///
    /// ## Errors
    /// * `NotFound` for an unknown code
    /// * `Rejected(GiftCardRedeemed)` once the balance is gone
    /// * `Rejected(GiftCardExpired { expired_at })`
    /// * `Rejected(GiftCardInsufficient { balance, requested })`
    pub async fn redeem(
        &self,
        code: &str,
        user_id: &str,
        amount: Option<Money>,
    ) -> DbResult<GiftCardRedemption> {
        let code = normalize_code(code);
        debug!(code = %code, user_id = %user_id, "Redeeming gift card");

        let mut tx = self.pool.begin().await?;
        let redemption = match redeem_in(&mut tx, &code, user_id, amount, Utc::now()).await {
            Ok(redemption) => redemption,
            Err(e) => {
                if e.is_rejection() {
                    warn!(code = %code, user_id = %user_id, error = %e, "Gift card redemption rejected");
                }
                return Err(e);
            }
        };
        tx.commit().await?;

        info!(
            code = %code,
            user_id = %user_id,
            redeemed = %redemption.redeemed,
            remaining = %redemption.remaining,
            "Gift card redeemed"
        );
        Ok(redemption)
    }

    /// Sum of everything ever redeemed from a card.
    pub async fn redeemed_total(&self, code: &str) -> DbResult<Money> {
        let cents: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0)
            FROM wallet_transactions
            WHERE gift_card_code = ?1 AND tx_type = 'gift_card'
            "#,
        )
        .bind(normalize_code(code))
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::from_cents(cents))
    }
}

async fn redeem_in(
    conn: &mut SqliteConnection,
    code: &str,
    user_id: &str,
    amount: Option<Money>,
    now: DateTime<Utc>,
) -> DbResult<GiftCardRedemption> {
    let touched = sqlx::query("UPDATE gift_cards SET updated_at = ?2 WHERE code = ?1")
        .bind(code)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    if touched.rows_affected() == 0 {
        return Err(DbError::not_found("GiftCard", code));
    }

    let sql = format!("{} WHERE code = ?1", SELECT_GIFT_CARD);
    let card = sqlx::query_as::<_, GiftCard>(&sql)
        .bind(code)
        .fetch_one(&mut *conn)
        .await?;

    let redeemed = check_redeemable(&card, amount, now)?;
    let remaining = card.balance() - redeemed;
    let status = if remaining.is_zero() {
        GiftCardStatus::Redeemed
    } else {
        GiftCardStatus::Active
    };

    sqlx::query("UPDATE gift_cards SET balance_cents = ?2, status = ?3 WHERE id = ?1")
        .bind(&card.id)
        .bind(remaining.cents())
        .bind(status)
        .execute(&mut *conn)
        .await?;

    let mut entry = LedgerEntry::new(
        WalletTransactionType::GiftCard,
        format!("Gift card {} redeemed", card.code),
    );
    entry.gift_card_code = Some(&card.code);
    let credit = credit_in(&mut *conn, user_id, redeemed, &entry).await?;

    Ok(GiftCardRedemption {
        code: card.code.clone(),
        redeemed,
        remaining,
        status,
        wallet_balance: credit.balance,
        wallet_transaction_id: credit.transaction.id,
    })
}

/// Decides how much of `card` may be redeemed now.
fn check_redeemable(card: &GiftCard, amount: Option<Money>, now: DateTime<Utc>) -> CoreResult<Money> {
    if card.status != GiftCardStatus::Active || card.balance().is_zero() {
        return Err(CoreError::GiftCardRedeemed);
    }
    if now > card.expires_at {
        return Err(CoreError::GiftCardExpired {
            expired_at: card.expires_at,
        });
    }

    let requested = amount.unwrap_or_else(|| card.balance());
    validate_amount("amount", requested)?;
    if requested > card.balance() {
        return Err(CoreError::GiftCardInsufficient {
            balance: card.balance(),
            requested,
        });
    }

    Ok(requested)
}

fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn generate_code() -> String {
    let raw = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
    format!("GC-{}", &raw[..12])
}

// =============================================================================
// Unit Tests
// =============================================================================
