//! # Flash-Sale Counter
//!
//! `sold_quantity` only moves through one guarded statement:
//!
//! ```text
//! UPDATE flash_sales
//!    SET sold_quantity = sold_quantity + :qty
//!  WHERE id = :id
//!    AND is_active = 1
//!    AND start_time <= :now AND end_time >= :now
//!    AND sold_quantity + :qty <= max_quantity
//! ```
//!
//! SQLite runs the check and the increment under one write lock, so two
//! buyers racing for the last units cannot both win. When the statement
//! touches nothing, the row is read again and
//! [`check_purchase`](kirana_core::flash_sale::check_purchase) names the
//! reason ("Flash sale sold out!", "Only 2 items available!", ...).

use chrono::{DateTime, Utc};
use kirana_core::flash_sale::{availability, check_purchase, validate_new_sale, FlashSaleAvailability};
use kirana_core::validation::validate_quantity;
use kirana_core::{FlashSale, Money};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};

const SELECT_FLASH_SALE: &str = r#"
    SELECT id, product_id, discount_percent, start_time, end_time,
           max_quantity, sold_quantity, is_active, created_at
    FROM flash_sales
"#;

/// Input for [`FlashSaleCounter::create_flash_sale`].
#[derive(Debug, Clone)]
pub struct NewFlashSale {
    pub product_id: String,
    pub discount_percent: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub max_quantity: i64,
}

/// Repository for flash sales and their sold counters.
#[derive(Debug, Clone)]
pub struct FlashSaleCounter {
    pool: SqlitePool,
}

impl FlashSaleCounter {
    pub fn new(pool: SqlitePool) -> Self {
        FlashSaleCounter { pool }
    }

    /// Creates a flash sale on an existing product.
    pub async fn create_flash_sale(&self, new: &NewFlashSale) -> DbResult<FlashSale> {
        validate_new_sale(new.discount_percent, new.max_quantity, new.start_time, new.end_time)?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM products WHERE id = ?1")
            .bind(&new.product_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(DbError::not_found("Product", &new.product_id));
        }

        let sale = FlashSale {
            id: Uuid::new_v4().to_string(),
            product_id: new.product_id.clone(),
            discount_percent: new.discount_percent,
            start_time: new.start_time,
            end_time: new.end_time,
            max_quantity: new.max_quantity,
            sold_quantity: 0,
            is_active: true,
            created_at: Utc::now(),
        };

        debug!(id = %sale.id, product_id = %sale.product_id, "Creating flash sale");

        sqlx::query(
            r#"
            INSERT INTO flash_sales (
                id, product_id, discount_percent, start_time, end_time,
                max_quantity, sold_quantity, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.product_id)
        .bind(sale.discount_percent)
        .bind(sale.start_time)
        .bind(sale.end_time)
        .bind(sale.max_quantity)
        .bind(sale.sold_quantity)
        .bind(sale.is_active)
        .bind(sale.created_at)
        .execute(&self.pool)
        .await?;

        info!(
            id = %sale.id,
            product_id = %sale.product_id,
            discount_percent = sale.discount_percent,
            max_quantity = sale.max_quantity,
            "Flash sale created"
        );
        Ok(sale)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<FlashSale>> {
        let mut conn = self.pool.acquire().await?;
        fetch_in(&mut conn, id).await
    }

    /// The sale running on a product at `now`, if any. Latest start wins.
    pub async fn active_for_product(
        &self,
        product_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<FlashSale>> {
        let sql = format!(
            "{} WHERE product_id = ?1 AND is_active = 1 \
             AND start_time <= ?2 AND end_time >= ?2 \
             ORDER BY start_time DESC, rowid DESC LIMIT 1",
            SELECT_FLASH_SALE
        );
        let sale = sqlx::query_as::<_, FlashSale>(&sql)
            .bind(product_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sale)
    }

    /// Remaining units, sold-out and almost-gone flags. Read only.
    pub async fn check_availability(&self, id: &str) -> DbResult<FlashSaleAvailability> {
        let sale = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("FlashSale", id))?;

        Ok(availability(&sale))
    }

    /// Buys `quantity` units from a sale.
    ///
    /// ## Errors
    /// * `Rejected(FlashSaleSoldOut)` when nothing is left
    /// * `Rejected(FlashSaleInsufficient { remaining })` when fewer than
    ///   `quantity` are left
    /// * `Rejected(FlashSaleInactive | FlashSaleNotStarted | FlashSaleEnded)`
    ///
    /// A rejected call never changes `sold_quantity`.
    pub async fn purchase(&self, id: &str, quantity: i64) -> DbResult<FlashSale> {
        let mut conn = self.pool.acquire().await?;

        let sale = match purchase_in(&mut conn, id, quantity, Utc::now()).await {
            Ok(sale) => sale,
            Err(e) => {
                if e.is_rejection() {
                    warn!(flash_sale_id = %id, quantity, error = %e, "Flash-sale purchase rejected");
                }
                return Err(e);
            }
        };

        info!(
            flash_sale_id = %id,
            quantity,
            sold = sale.sold_quantity,
            max = sale.max_quantity,
            "Flash-sale purchase accepted"
        );
        Ok(sale)
    }

    /// The discounted unit price of a sale's product.
    pub async fn flash_price(&self, id: &str) -> DbResult<Money> {
        let row: Option<(i64, u32)> = sqlx::query_as(
            r#"
            SELECT p.base_price_cents, fs.discount_percent
            FROM flash_sales fs
            JOIN products p ON p.id = fs.product_id
            WHERE fs.id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let (base_cents, percent) = row.ok_or_else(|| DbError::not_found("FlashSale", id))?;
        Ok(kirana_core::flash_sale::flash_price(Money::from_cents(base_cents), percent))
    }
}

// =============================================================================
// In-Transaction Helpers
// =============================================================================

pub(crate) async fn fetch_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<FlashSale>> {
    let sql = format!("{} WHERE id = ?1", SELECT_FLASH_SALE);
    let sale = sqlx::query_as::<_, FlashSale>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(sale)
}

/// The guarded increment. Returns the sale as it stands after the purchase.
pub(crate) async fn purchase_in(
    conn: &mut SqliteConnection,
    id: &str,
    quantity: i64,
    now: DateTime<Utc>,
) -> DbResult<FlashSale> {
    validate_quantity(quantity)?;
    debug!(flash_sale_id = %id, quantity, "Flash-sale purchase");

    let result = sqlx::query(
        r#"
        UPDATE flash_sales
        SET sold_quantity = sold_quantity + ?2
        WHERE id = ?1
          AND is_active = 1
          AND start_time <= ?3
          AND end_time >= ?3
          AND sold_quantity + ?2 <= max_quantity
        "#,
    )
    .bind(id)
    .bind(quantity)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let sale = fetch_in(&mut *conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("FlashSale", id))?;

    if result.rows_affected() == 0 {
        check_purchase(&sale, quantity, now)?;
        // The row passed every rule on re-read; the guard and the rules disagree.
        return Err(DbError::Internal(format!(
            "flash sale {} refused a purchase its rules allow",
            id
        )));
    }

    Ok(sale)
}

// =============================================================================
// Unit Tests
// =============================================================================
