//! # kirana-dispatch: Configuration and Notification Dispatch for Kirana
//!
//! Ledger operations never talk to a push service. They write notification
//! intents into the `notification_outbox` table in the same transaction as
//! the stock, price or wallet change that caused them. This crate drains
//! that table and loads the configuration the service runs with.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Dispatch Architecture                              │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    kirana-dispatch binary                        │  │
//! │  │                                                                  │  │
//! │  │  KiranaConfig::load ──► Database::new ──► dispatcher.run()      │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────────┐  ┌────────────────────┐    │
//! │  │ KiranaConfig   │  │ NotificationDis-   │  │ NotificationSink   │    │
//! │  │                │  │ patcher            │  │                    │    │
//! │  │ [database]     │  │ Polls the outbox   │  │ LogSink (built in) │    │
//! │  │ [checkout]     │  │ Retries failures   │  │ or a push client   │    │
//! │  │ [dispatch]     │  │ up to max_attempts │  │                    │    │
//! │  └────────────────┘  └────────────────────┘  └────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - TOML + environment configuration
//! - [`dispatcher`] - Outbox poll loop
//! - [`error`] - Dispatch error types
//! - [`sink`] - Delivery trait and the log sink
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kirana_dispatch::{KiranaConfig, LogSink, NotificationDispatcher};
//! use kirana_db::Database;
//!
//! let config = KiranaConfig::load(None)?;
//! let db = Arc::new(Database::new(config.db_config()).await?);
//!
//! let (dispatcher, handle) =
//!     NotificationDispatcher::new(db, config.dispatch.clone(), Arc::new(LogSink));
//! tokio::spawn(dispatcher.run());
//!
//! // later
//! handle.shutdown().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod sink;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{DatabaseSettings, DispatchSettings, KiranaConfig};
pub use dispatcher::{DispatchStats, DispatcherHandle, NotificationDispatcher};
pub use error::{DispatchError, DispatchResult};
pub use sink::{LogSink, NotificationSink};
