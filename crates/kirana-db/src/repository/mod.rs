//! # Repository Module
//!
//! One repository per ledger. Each holds a `SqlitePool` clone and is handed
//! out by [`Database`](crate::Database).
//!
//! ## Composition
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Ledgers and their helpers                           │
//! │                                                                         │
//! │  Public API (own transaction)        In-transaction helper (pub(crate)) │
//! │  ────────────────────────────        ────────────────────────────────── │
//! │  StockLedger::adjust_stock       →   inventory::adjust_stock_in        │
//! │  FlashSaleCounter::purchase      →   flash_sale::purchase_in           │
//! │  WalletLedger::deduct_money      →   wallet::debit_in                  │
//! │  WalletLedger::add_money         →   wallet::credit_in                 │
//! │  GiftCardLedger::redeem          →   wallet::credit_in                 │
//! │                                                                         │
//! │  CheckoutOrchestrator::checkout opens ONE transaction and calls the   │
//! │  helpers on it, so a late failure rolls every ledger back.            │
//! │                                                                         │
//! │  Helpers take `&mut SqliteConnection`; a Transaction derefs to one.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Catalog, list prices, dynamic quotes
//! - [`inventory::StockLedger`] - Stock counter and audit log
//! - [`flash_sale::FlashSaleCounter`] - Flash sales and sold counters
//! - [`offer::OfferRepository`] - Offers and coupon validation
//! - [`wallet::WalletLedger`] - Wallet balance, transactions, loyalty points
//! - [`gift_card::GiftCardLedger`] - Gift cards redeemed into the wallet
//! - [`alert::AlertRepository`] - Stock and price-drop subscriptions
//! - [`notification::NotificationOutbox`] - Notification intents
//! - [`delivery::DeliverySlotRepository`] - Delivery slot availability
//! - [`order::CheckoutOrchestrator`] - Orders

pub mod alert;
pub mod delivery;
pub mod flash_sale;
pub mod gift_card;
pub mod inventory;
pub mod notification;
pub mod offer;
pub mod order;
pub mod product;
pub mod wallet;
