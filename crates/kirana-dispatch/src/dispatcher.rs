//! # Notification Dispatcher
//!
//! Drains the `notification_outbox` table into a [`NotificationSink`].
//!
//! ## Dispatch Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Notification Dispatch Flow                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 notification_outbox Table                       │   │
//! │  │                                                                 │   │
//! │  │  id | user_id | kind          | payload | attempts | delivered │   │
//! │  │  ───┼─────────┼───────────────┼─────────┼──────────┼───────────│   │
//! │  │  1  │ u-1     │ low_stock     │ {...}   │ 0        │ NULL      │   │
//! │  │  2  │ u-7     │ back_in_stock │ {...}   │ 2        │ NULL      │   │
//! │  │  3  │ u-1     │ wallet_debit  │ {...}   │ 0        │ NULL      │   │
//! │  └────────────────────────────┬────────────────────────────────────┘   │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 NotificationDispatcher                          │   │
//! │  │                                                                 │   │
//! │  │  1. Poll: undelivered intents with attempts < max_attempts,    │   │
//! │  │           oldest first, LIMIT batch_size                       │   │
//! │  │                                                                 │   │
//! │  │  2. Deliver: sink.deliver(intent), one at a time               │   │
//! │  │                                                                 │   │
//! │  │  3. Mark: delivered_at = now          on Ok                    │   │
//! │  │           attempts += 1, last_error   on Err                   │   │
//! │  │                                                                 │   │
//! │  │  4. Cleanup: delete delivered intents past retention           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Intents that used up max_attempts stay in the table for inspection.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use kirana_db::Database;

use crate::config::DispatchSettings;
use crate::error::{DispatchError, DispatchResult};
use crate::sink::NotificationSink;

/// Polls between cleanup passes.
const CLEANUP_EVERY_POLLS: u64 = 720;

/// Outcome of one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: usize,
    pub failed: usize,
    /// Undelivered intents that are out of attempts.
    pub exhausted: i64,
}

// =============================================================================
// Dispatcher
// =============================================================================

pub struct NotificationDispatcher {
    db: Arc<Database>,
    settings: DispatchSettings,
    sink: Arc<dyn NotificationSink>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling a running dispatcher.
#[derive(Clone)]
pub struct DispatcherHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl DispatcherHandle {
    /// Triggers graceful shutdown. The batch in flight finishes first.
    pub async fn shutdown(&self) -> DispatchResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| DispatchError::ChannelError("Shutdown channel closed".into()))
    }
}

impl NotificationDispatcher {
    /// Creates a dispatcher and returns its handle.
    pub fn new(
        db: Arc<Database>,
        settings: DispatchSettings,
        sink: Arc<dyn NotificationSink>,
    ) -> (Self, DispatcherHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let dispatcher = NotificationDispatcher {
            db,
            settings,
            sink,
            shutdown_rx,
        };

        (dispatcher, DispatcherHandle { shutdown_tx })
    }

    /// Runs the poll loop until shutdown.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!(
            sink = self.sink.name(),
            poll_interval_secs = self.settings.poll_interval_secs,
            batch_size = self.settings.batch_size,
            "Notification dispatcher starting"
        );

        let poll_interval = Duration::from_secs(self.settings.poll_interval_secs.max(1));
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut polls: u64 = 0;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "Failed to dispatch notification batch");
                    }

                    polls += 1;
                    if polls % CLEANUP_EVERY_POLLS == 0 {
                        if let Err(e) = self.cleanup().await {
                            error!(error = %e, "Failed to clean up delivered notifications");
                        }
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Notification dispatcher shutting down");
                    break;
                }
            }
        }

        info!("Notification dispatcher stopped");
    }

    /// Delivers one batch of pending intents.
    pub async fn run_once(&self) -> DispatchResult<DispatchStats> {
        let outbox = self.db.notifications();
        let mut stats = DispatchStats {
            exhausted: outbox.count_exhausted(self.settings.max_attempts).await?,
            ..DispatchStats::default()
        };

        if stats.exhausted > 0 {
            warn!(
                count = stats.exhausted,
                max_attempts = self.settings.max_attempts,
                "Notifications exceeded max delivery attempts"
            );
        }

        let intents = outbox
            .get_retryable(self.settings.batch_size, self.settings.max_attempts)
            .await?;

        if intents.is_empty() {
            debug!("No pending notifications");
            return Ok(stats);
        }

        debug!(count = intents.len(), "Dispatching notification batch");

        for intent in &intents {
            match self.sink.deliver(intent).await {
                Ok(()) => {
                    outbox.mark_delivered(&intent.id).await?;
                    stats.delivered += 1;
                }
                Err(e) => {
                    warn!(
                        id = %intent.id,
                        kind = %intent.kind,
                        attempts = intent.attempts + 1,
                        error = %e,
                        "Notification delivery failed"
                    );
                    outbox.mark_failed(&intent.id, &e.to_string()).await?;
                    stats.failed += 1;
                }
            }
        }

        info!(
            delivered = stats.delivered,
            failed = stats.failed,
            "Notification batch dispatched"
        );
        Ok(stats)
    }

    /// Deletes delivered intents older than the retention window.
    pub async fn cleanup(&self) -> DispatchResult<u64> {
        let removed = self
            .db
            .notifications()
            .cleanup_delivered(self.settings.retention_days)
            .await?;

        if removed > 0 {
            info!(removed, retention_days = self.settings.retention_days, "Delivered notifications cleaned up");
        }
        Ok(removed)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kirana_core::{NotificationIntent, NotificationKind};
    use kirana_db::DbConfig;
    use serde_json::json;
    use std::collections::HashSet;
    use tokio::sync::Mutex;

    /// Records deliveries; fails for the listed user ids.
    #[derive(Default)]
    struct RecordingSink {
        failing_users: HashSet<String>,
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn deliver(&self, intent: &NotificationIntent) -> DispatchResult<()> {
            if self.failing_users.contains(&intent.user_id) {
                return Err(DispatchError::SinkFailed {
                    id: intent.id.clone(),
                    reason: "device unreachable".into(),
                });
            }
            self.delivered.lock().await.push(intent.user_id.clone());
            Ok(())
        }
    }

    async fn database() -> Arc<Database> {
        Arc::new(Database::new(DbConfig::in_memory()).await.unwrap())
    }

    fn settings(max_attempts: u32) -> DispatchSettings {
        DispatchSettings {
            poll_interval_secs: 1,
            batch_size: 10,
            max_attempts,
            retention_days: 7,
        }
    }

    async fn enqueue(db: &Database, user: &str) {
        db.notifications()
            .enqueue(user, NotificationKind::LowStock, Some("p-1"), &json!({ "stock": 3 }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_once_delivers_oldest_first() {
        let db = database().await;
        for user in ["u-1", "u-2", "u-3"] {
            enqueue(&db, user).await;
        }

        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, _handle) = NotificationDispatcher::new(db.clone(), settings(3), sink.clone());

        let stats = dispatcher.run_once().await.unwrap();
        assert_eq!(stats.delivered, 3);
        assert_eq!(stats.failed, 0);
        assert_eq!(*sink.delivered.lock().await, vec!["u-1", "u-2", "u-3"]);
        assert_eq!(db.notifications().count_pending().await.unwrap(), 0);

        // Nothing left to send
        assert_eq!(dispatcher.run_once().await.unwrap(), DispatchStats::default());
    }

    #[tokio::test]
    async fn test_failures_retry_until_exhausted() {
        let db = database().await;
        enqueue(&db, "u-ok").await;
        enqueue(&db, "u-offline").await;

        let sink = Arc::new(RecordingSink {
            failing_users: HashSet::from(["u-offline".to_string()]),
            ..RecordingSink::default()
        });
        let (dispatcher, _handle) = NotificationDispatcher::new(db.clone(), settings(2), sink.clone());

        let first = dispatcher.run_once().await.unwrap();
        assert_eq!((first.delivered, first.failed), (1, 1));

        let second = dispatcher.run_once().await.unwrap();
        assert_eq!((second.delivered, second.failed), (0, 1));

        // Out of attempts: skipped and reported
        let third = dispatcher.run_once().await.unwrap();
        assert_eq!((third.delivered, third.failed), (0, 0));
        assert_eq!(third.exhausted, 1);

        let pending = db.notifications().get_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 2);
        assert!(pending[0]
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("device unreachable")));
    }

    #[tokio::test]
    async fn test_run_loop_stops_on_shutdown() {
        let db = database().await;
        enqueue(&db, "u-1").await;

        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, handle) = NotificationDispatcher::new(db.clone(), settings(3), sink.clone());
        let task = tokio::spawn(dispatcher.run());

        // The first tick fires immediately
        for _ in 0..50 {
            if db.notifications().count_pending().await.unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(sink.delivered.lock().await.len(), 1);

        handle.shutdown().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_deliveries() {
        let db = database().await;
        enqueue(&db, "u-1").await;

        let (dispatcher, _handle) =
            NotificationDispatcher::new(db.clone(), settings(3), Arc::new(RecordingSink::default()));
        dispatcher.run_once().await.unwrap();

        // Delivered just now, inside the 7-day window
        assert_eq!(dispatcher.cleanup().await.unwrap(), 0);
    }
}
