//! # Checkout Orchestrator
//!
//! Turns a cart into a committed order in ONE transaction. Either every
//! ledger moves or none does.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    INSERT orders (totals 0)                 ← write lock taken here    │
//! │    price lines, coupon, fees, loyalty       ← kirana-core compute_bill │
//! │    slot: live orders in slot <= capacity?   ── no → SlotFull           │
//! │    for each line:                                                       │
//! │      flash line → FlashSaleCounter guarded increment                   │
//! │      other      → StockLedger adjust(-qty, sale, order_id)             │
//! │    loyalty points redeemed (guarded)                                    │
//! │    payment:                                                             │
//! │      wallet  → WalletLedger guarded debit      ── short → rejected     │
//! │      gateway → pending, status awaiting_payment                        │
//! │      cod     → due                                                      │
//! │    loyalty points earned (not for gateway until confirmed)             │
//! │    INSERT order_items, UPDATE orders totals                            │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Any Err above drops the transaction: stock, flash counters, wallet    │
//! │  and points are exactly as they were.                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Gateway Callback
//! ```text
//!   awaiting_payment ── confirm_gateway_payment ──► confirmed  (+ points)
//!          │
//!          └────────── fail_gateway_payment ─────► cancelled  (stock back,
//!                                                               points back)
//! ```
//! Flash-sale counters are not given back on failure; `sold_quantity` only
//! ever grows.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use kirana_core::checkout::{compute_bill, price_line, BillOptions};
use kirana_core::flash_sale::check_purchase;
use kirana_core::slots::{check_slot_offered, is_peak_slot, slot_key};
use kirana_core::validation::validate_id;
use kirana_core::{
    Bill, ChangeType, CheckoutPolicy, CoreError, Money, Order, OrderItem, OrderStatus,
    PaymentMethod, PaymentStatus, Product, WalletTransactionType,
};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::delivery::booked_count_in;
use crate::repository::flash_sale::{fetch_in as fetch_flash_sale_in, purchase_in};
use crate::repository::inventory::adjust_stock_in;
use crate::repository::offer::get_by_code_in;
use crate::repository::product::SELECT_PRODUCT;
use crate::repository::wallet::{credit_points_in, debit_in, redeem_points_in, LedgerEntry};

const SELECT_ORDER: &str = r#"
    SELECT id, user_id, store_id, status, payment_method, payment_status,
           subtotal_cents, coupon_code, coupon_discount_cents, delivery_fee_cents,
           slot_surcharge_cents, tip_cents, loyalty_points_redeemed,
           loyalty_discount_cents, loyalty_points_earned, total_cents,
           slot_date, slot_start_hour, transaction_id, created_at, updated_at
    FROM orders
"#;

/// One cart line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub product_id: String,
    pub quantity: i64,
    /// Buy through this flash sale instead of at the dynamic price.
    pub flash_sale_id: Option<String>,
}

impl CheckoutItem {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        CheckoutItem {
            product_id: product_id.into(),
            quantity,
            flash_sale_id: None,
        }
    }

    pub fn flash(product_id: impl Into<String>, quantity: i64, flash_sale_id: impl Into<String>) -> Self {
        CheckoutItem {
            product_id: product_id.into(),
            quantity,
            flash_sale_id: Some(flash_sale_id.into()),
        }
    }
}

/// A chosen delivery window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotChoice {
    pub date: NaiveDate,
    pub start_hour: u32,
}

/// Everything the shopper chose at checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: String,
    pub store_id: String,
    pub items: Vec<CheckoutItem>,
    pub coupon_code: Option<String>,
    pub slot: Option<SlotChoice>,
    pub tip: Money,
    /// Loyalty points the shopper wants to spend.
    pub loyalty_points: i64,
    pub payment_method: PaymentMethod,
}

impl CheckoutRequest {
    pub fn new(
        user_id: impl Into<String>,
        store_id: impl Into<String>,
        items: Vec<CheckoutItem>,
        payment_method: PaymentMethod,
    ) -> Self {
        CheckoutRequest {
            user_id: user_id.into(),
            store_id: store_id.into(),
            items,
            coupon_code: None,
            slot: None,
            tip: Money::zero(),
            loyalty_points: 0,
            payment_method,
        }
    }
}

/// A committed checkout.
#[derive(Debug, Clone)]
pub struct CheckoutReceipt {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub bill: Bill,
    /// Wallet balance after the debit, for wallet payments.
    pub wallet_balance: Option<Money>,
}

/// Composes the ledgers into an order.
#[derive(Debug, Clone)]
pub struct CheckoutOrchestrator {
    pool: SqlitePool,
    policy: CheckoutPolicy,
}

impl CheckoutOrchestrator {
    pub fn new(pool: SqlitePool, policy: CheckoutPolicy) -> Self {
        CheckoutOrchestrator { pool, policy }
    }

    /// Prices a cart without committing anything.
    pub async fn quote(&self, request: &CheckoutRequest) -> DbResult<Bill> {
        self.quote_at(request, Local::now()).await
    }

    pub async fn quote_at(&self, request: &CheckoutRequest, now: DateTime<Local>) -> DbResult<Bill> {
        let mut conn = self.pool.acquire().await?;
        let bill = build_bill_in(&mut conn, request, &self.policy, now).await?;

        if let Some(slot) = request.slot {
            let booked = booked_count_in(&mut conn, &request.store_id, slot.date, slot.start_hour).await?;
            if booked >= self.policy.slot_capacity {
                return Err(CoreError::SlotFull {
                    slot: slot_key(slot.date, slot.start_hour),
                }
                .into());
            }
        }

        Ok(bill)
    }

    /// Commits a cart: stock, flash counters, loyalty, payment and the
    /// order itself, all or nothing.
    pub async fn checkout(&self, request: &CheckoutRequest) -> DbResult<CheckoutReceipt> {
        self.checkout_at(request, Local::now()).await
    }

    pub async fn checkout_at(
        &self,
        request: &CheckoutRequest,
        now: DateTime<Local>,
    ) -> DbResult<CheckoutReceipt> {
        let order_id = Uuid::new_v4().to_string();
        debug!(
            order_id = %order_id,
            user_id = %request.user_id,
            store_id = %request.store_id,
            lines = request.items.len(),
            "Starting checkout"
        );

        let mut tx = self.pool.begin().await?;

        let receipt = match self.checkout_in(&mut tx, &order_id, request, now).await {
            Ok(receipt) => receipt,
            Err(e) => {
                if e.is_rejection() {
                    warn!(order_id = %order_id, user_id = %request.user_id, error = %e, "Checkout rejected");
                }
                return Err(e);
            }
        };

        tx.commit().await?;

        info!(
            order_id = %order_id,
            user_id = %request.user_id,
            total = %receipt.bill.total,
            payment_method = ?request.payment_method,
            status = %receipt.order.status,
            "Order placed"
        );
        Ok(receipt)
    }

    async fn checkout_in(
        &self,
        conn: &mut SqliteConnection,
        order_id: &str,
        request: &CheckoutRequest,
        now: DateTime<Local>,
    ) -> DbResult<CheckoutReceipt> {
        let created_at = Utc::now();
        let (status, payment_status) = match request.payment_method {
            PaymentMethod::Wallet => (OrderStatus::Placed, PaymentStatus::Paid),
            PaymentMethod::Gateway => (OrderStatus::AwaitingPayment, PaymentStatus::Pending),
            PaymentMethod::CashOnDelivery => (OrderStatus::Placed, PaymentStatus::Due),
        };

        // The order row goes in first so this transaction holds the write
        // lock before it reads any counter.
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, store_id, status, payment_method, payment_status,
                slot_date, slot_start_hour, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            "#,
        )
        .bind(order_id)
        .bind(&request.user_id)
        .bind(&request.store_id)
        .bind(status)
        .bind(request.payment_method)
        .bind(payment_status)
        .bind(request.slot.map(|s| s.date))
        .bind(request.slot.map(|s| s.start_hour))
        .bind(created_at)
        .execute(&mut *conn)
        .await?;

        let bill = build_bill_in(&mut *conn, request, &self.policy, now).await?;

        // The count includes the row inserted above.
        if let Some(slot) = request.slot {
            let booked = booked_count_in(&mut *conn, &request.store_id, slot.date, slot.start_hour).await?;
            if booked > self.policy.slot_capacity {
                return Err(CoreError::SlotFull {
                    slot: slot_key(slot.date, slot.start_hour),
                }
                .into());
            }
        }

        let now_utc = now.with_timezone(&Utc);
        for line in &bill.lines {
            match &line.flash_sale_id {
                Some(flash_sale_id) => {
                    purchase_in(&mut *conn, flash_sale_id, line.quantity, now_utc).await?;
                }
                None => {
                    adjust_stock_in(
                        &mut *conn,
                        &line.product_id,
                        -line.quantity,
                        ChangeType::Sale,
                        Some(order_id),
                        None,
                    )
                    .await?;
                }
            }
        }

        if bill.loyalty_points_redeemed > 0 {
            redeem_points_in(&mut *conn, &request.user_id, bill.loyalty_points_redeemed).await?;
        }

        let mut wallet_balance = None;
        if request.payment_method == PaymentMethod::Wallet && bill.total.is_positive() {
            let mut entry = LedgerEntry::new(
                WalletTransactionType::Purchase,
                format!("Payment for order {}", order_id),
            );
            entry.order_id = Some(order_id);
            let debit = debit_in(&mut *conn, &request.user_id, bill.total, &entry).await?;
            wallet_balance = Some(debit.balance);
        }

        if request.payment_method != PaymentMethod::Gateway {
            credit_points_in(&mut *conn, &request.user_id, bill.loyalty_points_earned).await?;
        }

        let mut items = Vec::with_capacity(bill.lines.len());
        for line in &bill.lines {
            let item = OrderItem {
                id: Uuid::new_v4().to_string(),
                order_id: order_id.to_string(),
                product_id: line.product_id.clone(),
                flash_sale_id: line.flash_sale_id.clone(),
                name_snapshot: line.name.clone(),
                unit_price_cents: line.unit_price.cents(),
                quantity: line.quantity,
                line_total_cents: line.line_total.cents(),
                created_at,
            };
            insert_item_in(&mut *conn, &item).await?;
            items.push(item);
        }

        sqlx::query(
            r#"
            UPDATE orders SET
                subtotal_cents = ?2,
                coupon_code = ?3,
                coupon_discount_cents = ?4,
                delivery_fee_cents = ?5,
                slot_surcharge_cents = ?6,
                tip_cents = ?7,
                loyalty_points_redeemed = ?8,
                loyalty_discount_cents = ?9,
                loyalty_points_earned = ?10,
                total_cents = ?11
            WHERE id = ?1
            "#,
        )
        .bind(order_id)
        .bind(bill.subtotal.cents())
        .bind(&bill.coupon_code)
        .bind(bill.coupon_discount.cents())
        .bind(bill.delivery_fee.cents())
        .bind(bill.slot_surcharge.cents())
        .bind(bill.tip.cents())
        .bind(bill.loyalty_points_redeemed)
        .bind(bill.loyalty_discount.cents())
        .bind(bill.loyalty_points_earned)
        .bind(bill.total.cents())
        .execute(&mut *conn)
        .await?;

        let order = fetch_order_in(&mut *conn, order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))?;

        Ok(CheckoutReceipt {
            order,
            items,
            bill,
            wallet_balance,
        })
    }

    /// Gateway callback for a verified payment.
    pub async fn confirm_gateway_payment(&self, order_id: &str, transaction_id: &str) -> DbResult<Order> {
        validate_id("transaction_id", transaction_id)?;
        debug!(order_id = %order_id, "Confirming gateway payment");

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = 'confirmed',
                payment_status = 'paid',
                transaction_id = ?2,
                updated_at = ?3
            WHERE id = ?1 AND payment_method = 'gateway' AND payment_status = 'pending'
            "#,
        )
        .bind(order_id)
        .bind(transaction_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let order = fetch_order_in(&mut tx, order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))?;

        if result.rows_affected() == 0 {
            return Err(invalid_state(&order, "confirm payment"));
        }

        credit_points_in(&mut tx, &order.user_id, order.loyalty_points_earned).await?;
        tx.commit().await?;

        info!(order_id = %order_id, transaction_id = %transaction_id, "Gateway payment confirmed");
        Ok(order)
    }

    /// Gateway callback for a failed payment: cancels the order and gives
    /// back its stock and redeemed points.
    pub async fn fail_gateway_payment(&self, order_id: &str, reason: &str) -> DbResult<Order> {
        debug!(order_id = %order_id, reason = %reason, "Failing gateway payment");

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = 'cancelled',
                payment_status = 'failed',
                updated_at = ?2
            WHERE id = ?1 AND payment_method = 'gateway' AND payment_status = 'pending'
            "#,
        )
        .bind(order_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let order = fetch_order_in(&mut tx, order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))?;

        if result.rows_affected() == 0 {
            return Err(invalid_state(&order, "fail payment"));
        }

        let notes = format!("payment failed: {}", reason);
        for item in fetch_items_in(&mut tx, order_id).await? {
            if item.flash_sale_id.is_none() {
                adjust_stock_in(
                    &mut tx,
                    &item.product_id,
                    item.quantity,
                    ChangeType::Return,
                    Some(order_id),
                    Some(&notes),
                )
                .await?;
            }
        }

        credit_points_in(&mut tx, &order.user_id, order.loyalty_points_redeemed).await?;
        tx.commit().await?;

        warn!(order_id = %order_id, reason = %reason, "Gateway payment failed, order cancelled");
        Ok(order)
    }

    pub async fn get_order(&self, order_id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order_in(&mut conn, order_id).await
    }

    pub async fn order_items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let mut conn = self.pool.acquire().await?;
        fetch_items_in(&mut conn, order_id).await
    }

    /// A user's orders, newest first.
    pub async fn orders_for_user(&self, user_id: &str, limit: u32) -> DbResult<Vec<Order>> {
        let sql = format!(
            "{} WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            SELECT_ORDER
        );
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(orders)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Prices a request against the rows visible on `conn`.
async fn build_bill_in(
    conn: &mut SqliteConnection,
    request: &CheckoutRequest,
    policy: &CheckoutPolicy,
    now: DateTime<Local>,
) -> DbResult<Bill> {
    validate_id("user_id", &request.user_id)?;
    validate_id("store_id", &request.store_id)?;

    let local_now = now.naive_local();
    let now_utc = now.with_timezone(&Utc);

    let delivery_time = match request.slot {
        Some(slot) => {
            check_slot_offered(slot.date, slot.start_hour, local_now)?;
            slot_start(slot)?
        }
        None => local_now,
    };

    let product_sql = format!("{} WHERE id = ?1", SELECT_PRODUCT);
    let mut lines = Vec::with_capacity(request.items.len());
    for item in &request.items {
        let product = sqlx::query_as::<_, Product>(&product_sql)
            .bind(&item.product_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found("Product", &item.product_id))?;

        let flash_sale = match &item.flash_sale_id {
            Some(id) => {
                let sale = fetch_flash_sale_in(&mut *conn, id)
                    .await?
                    .ok_or_else(|| DbError::not_found("FlashSale", id))?;
                check_purchase(&sale, item.quantity, now_utc)?;
                Some(sale)
            }
            None => None,
        };

        lines.push(price_line(
            &product,
            &request.store_id,
            item.quantity,
            flash_sale.as_ref(),
            delivery_time,
        )?);
    }

    let offer = match request.coupon_code.as_deref() {
        Some(code) => get_by_code_in(&mut *conn, code).await?,
        None => None,
    };

    let loyalty_points_available: Option<i64> =
        sqlx::query_scalar("SELECT loyalty_points FROM wallets WHERE user_id = ?1")
            .bind(&request.user_id)
            .fetch_optional(&mut *conn)
            .await?;

    let options = BillOptions {
        store_id: &request.store_id,
        coupon_code: request.coupon_code.as_deref(),
        offer: offer.as_ref(),
        slot_is_peak: request.slot.is_some_and(|s| is_peak_slot(s.start_hour)),
        tip: request.tip,
        loyalty_points_requested: request.loyalty_points,
        loyalty_points_available: loyalty_points_available.unwrap_or(0),
        now: now_utc,
    };

    Ok(compute_bill(lines, &options, policy)?)
}

fn slot_start(slot: SlotChoice) -> DbResult<NaiveDateTime> {
    slot.date.and_hms_opt(slot.start_hour, 0, 0).ok_or_else(|| {
        CoreError::SlotUnavailable {
            slot: slot_key(slot.date, slot.start_hour),
        }
        .into()
    })
}

fn invalid_state(order: &Order, action: &str) -> DbError {
    CoreError::InvalidOrderState {
        order_id: order.id.clone(),
        status: order.status.to_string(),
        action: action.to_string(),
    }
    .into()
}

async fn fetch_order_in(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Option<Order>> {
    let sql = format!("{} WHERE id = ?1", SELECT_ORDER);
    let order = sqlx::query_as::<_, Order>(&sql)
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(order)
}

async fn fetch_items_in(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<OrderItem>> {
    let items = sqlx::query_as::<_, OrderItem>(
        r#"
        SELECT id, order_id, product_id, flash_sale_id, name_snapshot,
               unit_price_cents, quantity, line_total_cents, created_at
        FROM order_items
        WHERE order_id = ?1
        ORDER BY rowid ASC
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

async fn insert_item_in(conn: &mut SqliteConnection, item: &OrderItem) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO order_items (
            id, order_id, product_id, flash_sale_id, name_snapshot,
            unit_price_cents, quantity, line_total_cents, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&item.id)
    .bind(&item.order_id)
    .bind(&item.product_id)
    .bind(&item.flash_sale_id)
    .bind(&item.name_snapshot)
    .bind(item.unit_price_cents)
    .bind(item.quantity)
    .bind(item.line_total_cents)
    .bind(item.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Database;
    use crate::repository::flash_sale::NewFlashSale;
    use crate::repository::offer::{NewDiscount, NewOffer};
    use crate::test_support::{file_db, memory_db, memory_db_with, product};
    use chrono::Duration;
    use kirana_core::OfferType;

    /// Tomorrow 10:00, a non-peak slot outside every time-of-day rule.
    fn tomorrow_morning() -> SlotChoice {
        SlotChoice {
            date: Local::now().date_naive() + Duration::days(1),
            start_hour: 10,
        }
    }

    async fn orders_count(db: &Database) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    async fn welcome20(db: &Database) {
        let now = Utc::now();
        db.offers()
            .create_offer(&NewOffer {
                code: Some("WELCOME20".to_string()),
                title: "20% off".to_string(),
                discount: NewDiscount::Percent {
                    percent: 20,
                    max_discount: Some(Money::from_rupees(100)),
                },
                min_order_amount: Money::from_rupees(299),
                offer_type: OfferType::SiteWide,
                store_id: None,
                valid_from: now - Duration::days(1),
                valid_until: now + Duration::days(30),
            })
            .await
            .unwrap();
    }

    async fn live_flash_sale(db: &Database, product_id: &str, max_quantity: i64) -> String {
        let now = Utc::now();
        db.flash_sales()
            .create_flash_sale(&NewFlashSale {
                product_id: product_id.to_string(),
                discount_percent: 30,
                start_time: now - Duration::hours(1),
                end_time: now + Duration::hours(1),
                max_quantity,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_wallet_checkout_moves_every_ledger() {
        let db = memory_db().await;
        let rice = product(&db, "India Gate Rice 1kg", 100, 10).await;
        let ghee = product(&db, "Amul Ghee 500ml", 200, 10).await;
        let flash_id = live_flash_sale(&db, &ghee.id, 5).await;
        welcome20(&db).await;
        db.wallets().add_money("u-1", Money::from_rupees(1000), None).await.unwrap();

        let mut request = CheckoutRequest::new(
            "u-1",
            "store-1",
            vec![
                CheckoutItem::new(&rice.id, 2),
                CheckoutItem::flash(&ghee.id, 1, &flash_id),
            ],
            PaymentMethod::Wallet,
        );
        request.coupon_code = Some("welcome20".to_string());
        request.slot = Some(tomorrow_morning());

        let quote = db.checkout().quote(&request).await.unwrap();
        let receipt = db.checkout().checkout(&request).await.unwrap();
        assert_eq!(quote.total, receipt.bill.total);

        // 2 × ₹100 + ₹140 flash = ₹340; 20% = ₹68 off; ₹40 delivery
        let bill = &receipt.bill;
        assert_eq!(bill.subtotal, Money::from_rupees(340));
        assert_eq!(bill.coupon_discount, Money::from_rupees(68));
        assert_eq!(bill.coupon_code.as_deref(), Some("WELCOME20"));
        assert_eq!(bill.delivery_fee, Money::from_rupees(40));
        assert_eq!(bill.total, Money::from_rupees(312));
        assert_eq!(bill.loyalty_points_earned, 3);

        assert_eq!(receipt.order.status, OrderStatus::Placed);
        assert_eq!(receipt.order.payment_status, PaymentStatus::Paid);
        assert_eq!(receipt.order.total(), Money::from_rupees(312));
        assert_eq!(receipt.wallet_balance, Some(Money::from_rupees(688)));
        assert_eq!(receipt.items.len(), 2);

        // Flash lines move the flash counter, not the shelf
        let stored_rice = db.products().get_product(&rice.id).await.unwrap().unwrap();
        let stored_ghee = db.products().get_product(&ghee.id).await.unwrap().unwrap();
        assert_eq!(stored_rice.stock, 8);
        assert_eq!(stored_ghee.stock, 10);
        let sale = db.flash_sales().get(&flash_id).await.unwrap().unwrap();
        assert_eq!(sale.sold_quantity, 1);

        let history = db.stock().inventory_history(&rice.id, 10).await.unwrap();
        assert_eq!(history.last().unwrap().order_id.as_deref(), Some(receipt.order.id.as_str()));

        assert_eq!(db.wallets().loyalty_points("u-1").await.unwrap(), 3);
        assert!(db.wallets().audit("u-1").await.unwrap().consistent);

        let items = db.checkout().order_items(&receipt.order.id).await.unwrap();
        assert_eq!(items[1].flash_sale_id.as_deref(), Some(flash_id.as_str()));
        assert_eq!(items[1].unit_price_cents, 14_000);

        let slots = db
            .delivery_slots()
            .slots(&request.store_id, Some(tomorrow_morning().date))
            .await
            .unwrap();
        let ten = slots.iter().find(|s| s.start_hour == 10).unwrap();
        assert_eq!(ten.booked, 1);
    }

    #[tokio::test]
    async fn test_failed_line_rolls_back_everything() {
        let db = memory_db().await;
        let milk = product(&db, "Amul Taaza 1L", 68, 10).await;
        let bread = product(&db, "Harvest Gold Bread", 45, 1).await;
        db.wallets().add_money("u-1", Money::from_rupees(1000), None).await.unwrap();

        let mut request = CheckoutRequest::new(
            "u-1",
            "store-1",
            vec![CheckoutItem::new(&milk.id, 3), CheckoutItem::new(&bread.id, 2)],
            PaymentMethod::Wallet,
        );
        request.slot = Some(tomorrow_morning());

        let err = db.checkout().checkout(&request).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Rejected(CoreError::InsufficientStock { available: 1, requested: 2, .. })
        ));

        assert_eq!(db.products().get_product(&milk.id).await.unwrap().unwrap().stock, 10);
        assert_eq!(db.products().get_product(&bread.id).await.unwrap().unwrap().stock, 1);
        assert_eq!(db.wallets().balance("u-1").await.unwrap(), Money::from_rupees(1000));
        assert_eq!(db.stock().inventory_history(&milk.id, 10).await.unwrap().len(), 1);
        assert_eq!(orders_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_short_wallet_rolls_back_stock_and_flash() {
        let db = memory_db().await;
        let tv = product(&db, "Mi TV 32in", 15_000, 3).await;
        let buds = product(&db, "Boat Airdopes", 2_000, 3).await;
        let flash_id = live_flash_sale(&db, &buds.id, 10).await;
        db.wallets().add_money("u-1", Money::from_rupees(50), None).await.unwrap();

        let request = CheckoutRequest::new(
            "u-1",
            "store-1",
            vec![CheckoutItem::new(&tv.id, 1), CheckoutItem::flash(&buds.id, 2, &flash_id)],
            PaymentMethod::Wallet,
        );

        let err = db.checkout().checkout_at(&request, Local::now()).await.unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::InsufficientWalletBalance { .. })));

        assert_eq!(db.products().get_product(&tv.id).await.unwrap().unwrap().stock, 3);
        assert_eq!(db.flash_sales().get(&flash_id).await.unwrap().unwrap().sold_quantity, 0);
        assert_eq!(db.wallets().balance("u-1").await.unwrap(), Money::from_rupees(50));
        assert_eq!(db.wallets().transactions("u-1", 10).await.unwrap().len(), 1);
        assert_eq!(orders_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_rejected_coupon_fails_checkout() {
        let db = memory_db().await;
        let salt = product(&db, "Tata Salt 1kg", 28, 10).await;
        welcome20(&db).await;

        let mut request = CheckoutRequest::new(
            "u-1",
            "store-1",
            vec![CheckoutItem::new(&salt.id, 1)],
            PaymentMethod::CashOnDelivery,
        );
        request.coupon_code = Some("WELCOME20".to_string());
        request.slot = Some(tomorrow_morning());

        let err = db.checkout().checkout(&request).await.unwrap_err();
        assert_eq!(err.to_string(), "Minimum order amount of ₹299.00 required");
        assert_eq!(db.products().get_product(&salt.id).await.unwrap().unwrap().stock, 10);
        assert_eq!(orders_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_gateway_confirm_credits_points_once() {
        let db = memory_db().await;
        let atta = product(&db, "Aashirvaad Atta 5kg", 300, 10).await;

        let mut request = CheckoutRequest::new(
            "u-1",
            "store-1",
            vec![CheckoutItem::new(&atta.id, 2)],
            PaymentMethod::Gateway,
        );
        request.slot = Some(tomorrow_morning());

        let receipt = db.checkout().checkout(&request).await.unwrap();
        assert_eq!(receipt.order.status, OrderStatus::AwaitingPayment);
        assert_eq!(receipt.order.payment_status, PaymentStatus::Pending);
        assert_eq!(receipt.bill.total, Money::from_rupees(600));
        assert_eq!(receipt.order.loyalty_points_earned, 6);
        assert_eq!(db.wallets().loyalty_points("u-1").await.unwrap(), 0);
        assert_eq!(db.products().get_product(&atta.id).await.unwrap().unwrap().stock, 8);

        let order = db
            .checkout()
            .confirm_gateway_payment(&receipt.order.id, "pay_abc")
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.transaction_id.as_deref(), Some("pay_abc"));
        assert_eq!(db.wallets().loyalty_points("u-1").await.unwrap(), 6);

        let err = db
            .checkout()
            .confirm_gateway_payment(&receipt.order.id, "pay_abc")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::InvalidOrderState { .. })));
        assert_eq!(db.wallets().loyalty_points("u-1").await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_gateway_failure_returns_stock_and_points() {
        let db = memory_db().await;
        let oil = product(&db, "Fortune Oil 1L", 180, 10).await;
        let buds = product(&db, "Boat Airdopes", 2_000, 3).await;
        let flash_id = live_flash_sale(&db, &buds.id, 10).await;

        let mut conn = db.pool().acquire().await.unwrap();
        credit_points_in(&mut conn, "u-1", 50).await.unwrap();
        drop(conn);

        let mut request = CheckoutRequest::new(
            "u-1",
            "store-1",
            vec![CheckoutItem::new(&oil.id, 2), CheckoutItem::flash(&buds.id, 1, &flash_id)],
            PaymentMethod::Gateway,
        );
        request.slot = Some(tomorrow_morning());
        request.loyalty_points = 20;

        let receipt = db.checkout().checkout(&request).await.unwrap();
        assert_eq!(receipt.bill.loyalty_discount, Money::from_rupees(20));
        assert_eq!(db.wallets().loyalty_points("u-1").await.unwrap(), 30);

        let order = db
            .checkout()
            .fail_gateway_payment(&receipt.order.id, "card declined")
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.payment_status, PaymentStatus::Failed);

        assert_eq!(db.products().get_product(&oil.id).await.unwrap().unwrap().stock, 10);
        assert_eq!(db.wallets().loyalty_points("u-1").await.unwrap(), 50);
        // sold_quantity never goes back down
        assert_eq!(db.flash_sales().get(&flash_id).await.unwrap().unwrap().sold_quantity, 1);

        let history = db.stock().inventory_history(&oil.id, 10).await.unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.change_type, ChangeType::Return);
        assert_eq!(last.notes.as_deref(), Some("payment failed: card declined"));

        // Cancelled orders free their slot
        let slots = db
            .delivery_slots()
            .slots(&request.store_id, Some(tomorrow_morning().date))
            .await
            .unwrap();
        assert_eq!(slots.iter().find(|s| s.start_hour == 10).unwrap().booked, 0);

        let err = db
            .checkout()
            .fail_gateway_payment(&receipt.order.id, "again")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::InvalidOrderState { .. })));
    }

    #[tokio::test]
    async fn test_full_slot_is_rejected() {
        let db = memory_db_with(CheckoutPolicy {
            slot_capacity: 1,
            ..CheckoutPolicy::default()
        })
        .await;
        let eggs = product(&db, "Eggs x6", 60, 10).await;

        let mut request = CheckoutRequest::new(
            "u-1",
            "store-1",
            vec![CheckoutItem::new(&eggs.id, 1)],
            PaymentMethod::CashOnDelivery,
        );
        request.slot = Some(tomorrow_morning());

        let first = db.checkout().checkout(&request).await.unwrap();
        assert_eq!(first.order.payment_status, PaymentStatus::Due);

        let err = db.checkout().quote(&request).await.unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::SlotFull { .. })));
        let err = db.checkout().checkout(&request).await.unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::SlotFull { .. })));

        assert_eq!(db.products().get_product(&eggs.id).await.unwrap().unwrap().stock, 9);
        assert_eq!(orders_count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_wrong_store_and_unknown_product() {
        let db = memory_db().await;
        let eggs = product(&db, "Eggs x6", 60, 10).await;

        let request = CheckoutRequest::new(
            "u-1",
            "store-2",
            vec![CheckoutItem::new(&eggs.id, 1)],
            PaymentMethod::CashOnDelivery,
        );
        let err = db.checkout().quote(&request).await.unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::WrongStore { .. })));

        let request = CheckoutRequest::new(
            "u-1",
            "store-1",
            vec![CheckoutItem::new("missing", 1)],
            PaymentMethod::CashOnDelivery,
        );
        let err = db.checkout().checkout(&request).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
        assert_eq!(orders_count(&db).await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checkouts_share_the_shelf() {
        let db = file_db().await;
        let mango = product(&db, "Alphonso Mango 1kg", 400, 5).await;

        let mut handles = Vec::new();
        for i in 0..12 {
            let orchestrator = db.checkout();
            let request = CheckoutRequest::new(
                format!("u-{}", i),
                "store-1",
                vec![CheckoutItem::new(&mango.id, 1)],
                PaymentMethod::CashOnDelivery,
            );
            handles.push(tokio::spawn(async move { orchestrator.checkout(&request).await }));
        }

        let mut placed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => placed += 1,
                Err(e) => assert!(e.is_rejection(), "unexpected error: {}", e),
            }
        }

        assert_eq!(placed, 5);
        assert_eq!(db.products().get_product(&mango.id).await.unwrap().unwrap().stock, 0);
        assert_eq!(orders_count(&db).await, 5);
    }
}
