//! # Domain Types
//!
//! Ledger records and their status enums.
//!
//! ## Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Who Owns Which Counter                                 │
//! │                                                                         │
//! │  Stock Ledger        Product.stock          + InventoryHistoryEntry    │
//! │  Flash-Sale Counter  FlashSale.sold_quantity                           │
//! │  Wallet Ledger       Wallet.balance_cents   + WalletTransaction        │
//! │  Gift Card Ledger    GiftCard.balance_cents (credits the wallet)       │
//! │  Checkout            Order + OrderItem (composes all of the above)     │
//! │                                                                         │
//! │  Cross-ledger effects (a low-stock notice, a wallet credit notice)     │
//! │  are NotificationIntent rows, never a write into another ledger.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Monetary columns are `*_cents: i64` (paise) with a `Money` accessor, so the
//! rows map one-to-one onto SQLite columns.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Product & Stock Ledger
// =============================================================================

/// A product listed by a store.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub store_id: String,
    pub name: String,
    /// List price per unit before any dynamic rule.
    pub base_price_cents: i64,
    /// Owned by the Stock Ledger. Never written directly.
    pub stock: i64,
    /// Stock at or below this (and above zero) counts as "low".
    pub low_stock_threshold: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn base_price(&self) -> Money {
        Money::from_cents(self.base_price_cents)
    }

    #[inline]
    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }

    /// `0 < stock <= low_stock_threshold`.
    pub fn is_low_stock(&self) -> bool {
        self.stock > 0 && self.stock <= self.low_stock_threshold
    }
}

/// Why a stock quantity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ChangeType {
    /// Goods received from a supplier.
    Restock,
    /// Sold through checkout.
    Sale,
    /// Stock-take correction. The counted quantity is authoritative.
    Adjustment,
    /// Goods back from a cancelled or returned order.
    Return,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Restock => "restock",
            ChangeType::Sale => "sale",
            ChangeType::Adjustment => "adjustment",
            ChangeType::Return => "return",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable line of the inventory audit log.
///
/// Per product, in creation order, `new_quantity` of entry n equals
/// `previous_quantity` of entry n+1, so the log replays to the current stock.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryHistoryEntry {
    pub id: String,
    pub product_id: String,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub change_type: ChangeType,
    pub order_id: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Result of a stock adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StockLevel {
    pub new_quantity: i64,
    pub in_stock: bool,
}

// =============================================================================
// Flash Sale
// =============================================================================

/// A time-boxed, quantity-capped discount on one product.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct FlashSale {
    pub id: String,
    pub product_id: String,
    pub discount_percent: u32,
    #[ts(as = "String")]
    pub start_time: DateTime<Utc>,
    #[ts(as = "String")]
    pub end_time: DateTime<Utc>,
    pub max_quantity: i64,
    /// Monotonic; there is no decrement path.
    pub sold_quantity: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl FlashSale {
    #[inline]
    pub fn remaining(&self) -> i64 {
        self.max_quantity - self.sold_quantity
    }

    /// `is_active && start_time <= now <= end_time`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.start_time <= now && now <= self.end_time
    }
}

// =============================================================================
// Offers / Coupons
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum OfferType {
    /// Discount on one store's goods.
    ShopDiscount,
    /// Discount on the delivery fee only.
    DeliveryDeal,
    /// Discount on any store.
    SiteWide,
}

/// A promotion. Coupons are offers with a `code`.
///
/// Exactly one of `discount_percent` / `discount_amount_cents` is set; the
/// schema enforces it and [`Offer::discount`] exposes it as one value.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Offer {
    pub id: String,
    /// Upper-case coupon code. `None` for automatic promos.
    pub code: Option<String>,
    pub title: String,
    pub discount_percent: Option<u32>,
    pub discount_amount_cents: Option<i64>,
    pub min_order_amount_cents: i64,
    /// Cap for percentage offers.
    pub max_discount_cents: Option<i64>,
    pub offer_type: OfferType,
    /// When set, the coupon only applies to orders from this store.
    pub store_id: Option<String>,
    #[ts(as = "String")]
    pub valid_from: DateTime<Utc>,
    #[ts(as = "String")]
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// The discount half of an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum OfferDiscount {
    Percent(u32),
    Flat(Money),
}

impl Offer {
    /// Returns the discount rule, or `None` for a row that breaks the XOR rule.
    pub fn discount(&self) -> Option<OfferDiscount> {
        match (self.discount_percent, self.discount_amount_cents) {
            (Some(pct), None) => Some(OfferDiscount::Percent(pct)),
            (None, Some(cents)) => Some(OfferDiscount::Flat(Money::from_cents(cents))),
            _ => None,
        }
    }

    #[inline]
    pub fn min_order_amount(&self) -> Money {
        Money::from_cents(self.min_order_amount_cents)
    }

    #[inline]
    pub fn max_discount(&self) -> Option<Money> {
        self.max_discount_cents.map(Money::from_cents)
    }
}

// =============================================================================
// Wallet
// =============================================================================

/// Per-user wallet row: monetary balance plus loyalty points.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Wallet {
    pub user_id: String,
    /// Never negative. Equals the sum of the user's transactions.
    pub balance_cents: i64,
    pub loyalty_points: i64,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    #[inline]
    pub fn balance(&self) -> Money {
        Money::from_cents(self.balance_cents)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum WalletTransactionType {
    /// Money added by the user (optionally via the payment gateway).
    TopUp,
    /// Paid for an order.
    Purchase,
    /// Credited from a gift card redemption.
    GiftCard,
}

/// Append-only wallet ledger line. Positive = credit, negative = debit.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct WalletTransaction {
    pub id: String,
    pub user_id: String,
    pub amount_cents: i64,
    pub tx_type: WalletTransactionType,
    pub description: String,
    pub order_id: Option<String>,
    /// Payment gateway reference for gateway-funded top-ups.
    pub transaction_id: Option<String>,
    /// Set on gift-card credits, so redemptions can be summed per card.
    pub gift_card_code: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

/// Balance against ledger sum for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct WalletAudit {
    pub balance: Money,
    pub ledger_sum: Money,
    pub consistent: bool,
}

// =============================================================================
// Gift Card
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum GiftCardStatus {
    Active,
    /// Balance reached exactly zero. Terminal.
    Redeemed,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct GiftCard {
    pub id: String,
    pub code: String,
    /// Face value at issue.
    pub amount_cents: i64,
    /// Remaining. `0 <= balance <= amount`.
    pub balance_cents: i64,
    pub status: GiftCardStatus,
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl GiftCard {
    #[inline]
    pub fn balance(&self) -> Money {
        Money::from_cents(self.balance_cents)
    }

    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

/// What a redemption did.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct GiftCardRedemption {
    pub code: String,
    pub redeemed: Money,
    pub remaining: Money,
    pub status: GiftCardStatus,
    pub wallet_balance: Money,
    pub wallet_transaction_id: String,
}

// =============================================================================
// Alerts & Notification Intents
// =============================================================================

/// Subscription to stock changes on one product.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockAlert {
    pub id: String,
    pub user_id: String,
    pub product_id: String,
    /// Set once the low-stock notice went out; cleared when stock comes back.
    pub is_notified: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Subscription to price decreases on one product.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PriceDropAlert {
    pub id: String,
    pub user_id: String,
    pub product_id: String,
    pub is_notified: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum NotificationKind {
    LowStock,
    BackInStock,
    PriceDrop,
    WalletCredit,
    WalletDebit,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::LowStock => "low_stock",
            NotificationKind::BackInStock => "back_in_stock",
            NotificationKind::PriceDrop => "price_drop",
            NotificationKind::WalletCredit => "wallet_credit",
            NotificationKind::WalletDebit => "wallet_debit",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification waiting for the external dispatcher.
///
/// Written inside the ledger transaction that caused it; delivered later,
/// best-effort.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct NotificationIntent {
    pub id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub product_id: Option<String>,
    /// JSON body for the push transport.
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub attempted_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub delivered_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum OrderStatus {
    /// Committed and paid (wallet) or payable on delivery.
    Placed,
    /// Stock is held; waiting for the gateway callback.
    AwaitingPayment,
    /// Gateway confirmed the payment.
    Confirmed,
    /// Gateway payment failed; stock returned.
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Placed => "placed",
            OrderStatus::AwaitingPayment => "awaiting_payment",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PaymentMethod {
    /// Debited from the Wallet Ledger at checkout.
    Wallet,
    /// Deferred to the external payment gateway.
    Gateway,
    CashOnDelivery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    /// Cash on delivery; collected by the rider.
    Due,
}

/// A committed order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub store_id: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub subtotal_cents: i64,
    pub coupon_code: Option<String>,
    pub coupon_discount_cents: i64,
    pub delivery_fee_cents: i64,
    pub slot_surcharge_cents: i64,
    pub tip_cents: i64,
    pub loyalty_points_redeemed: i64,
    pub loyalty_discount_cents: i64,
    pub loyalty_points_earned: i64,
    pub total_cents: i64,
    #[ts(as = "Option<String>")]
    pub slot_date: Option<NaiveDate>,
    pub slot_start_hour: Option<u32>,
    pub transaction_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A line of a committed order. Name and price are frozen at checkout.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub flash_sale_id: Option<String>,
    pub name_snapshot: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    pub line_total_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
