//! # kirana-db: Ledger Storage for Kirana
//!
//! SQLite persistence for every Kirana ledger. This crate owns each atomic
//! read-modify-write: nothing outside it changes a stock count, a flash-sale
//! counter, a wallet balance or a gift-card balance.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Kirana Data Flow                                │
//! │                                                                         │
//! │  Storefront / gateway callback / restock job                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     kirana-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ StockLedger    │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ FlashSaleCtr   │    │ 001_initial  │  │   │
//! │  │   │ CheckoutPolicy│    │ WalletLedger   │    │  _schema.sql │  │   │
//! │  │   │               │    │ GiftCardLedger │    │              │  │   │
//! │  │   │               │    │ Checkout ...   │    │              │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  SQLite (WAL)                      notification_outbox ──► kirana-dispatch
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - One repository per ledger
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kirana_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("./kirana.db")).await?;
//!
//! let sale = db.flash_sales().purchase(&flash_sale_id, 2).await?;
//! let receipt = db.checkout().checkout(&request).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::alert::AlertRepository;
pub use repository::delivery::DeliverySlotRepository;
pub use repository::flash_sale::{FlashSaleCounter, NewFlashSale};
pub use repository::gift_card::GiftCardLedger;
pub use repository::inventory::StockLedger;
pub use repository::notification::NotificationOutbox;
pub use repository::offer::{NewDiscount, NewOffer, OfferRepository};
pub use repository::order::{
    CheckoutItem, CheckoutOrchestrator, CheckoutReceipt, CheckoutRequest, SlotChoice,
};
pub use repository::product::{NewProduct, ProductRepository};
pub use repository::wallet::{WalletLedger, WalletUpdate};
