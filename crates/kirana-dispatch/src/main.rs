//! # Kirana Dispatch Service
//!
//! Opens the ledger database and delivers queued notifications until
//! Ctrl-C / SIGTERM.
//!
//! ## Usage
//! ```bash
//! # Platform config file + environment
//! cargo run -p kirana-dispatch
//!
//! # Explicit config file
//! cargo run -p kirana-dispatch -- --config ./kirana.toml
//!
//! # More log output
//! RUST_LOG=debug cargo run -p kirana-dispatch
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use kirana_db::Database;
use kirana_dispatch::{KiranaConfig, LogSink, NotificationDispatcher};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kirana=debug,sqlx=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Kirana Notification Dispatcher");
                println!();
                println!("Usage: kirana-dispatch [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  Config file (default: platform config dir, kirana.toml)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            other => warn!(arg = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let config = KiranaConfig::load(config_path)?;
    info!(
        db = %config.database.path.display(),
        poll_interval_secs = config.dispatch.poll_interval_secs,
        "Starting Kirana dispatcher"
    );

    let db = Arc::new(Database::new(config.db_config()).await?);
    let pending = db.notifications().count_pending().await?;
    info!(pending, "Database ready");

    let (dispatcher, handle) =
        NotificationDispatcher::new(db.clone(), config.dispatch.clone(), Arc::new(LogSink));
    let task = tokio::spawn(dispatcher.run());

    shutdown_signal().await;

    handle.shutdown().await?;
    task.await?;
    db.close().await;

    info!("Dispatcher shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
