//! # Notification Sinks
//!
//! Where delivered intents go. The push transport (SMS, app push, email)
//! lives outside this workspace and plugs in as a [`NotificationSink`];
//! [`LogSink`] is the built-in sink that writes each intent to the log.

use async_trait::async_trait;
use kirana_core::NotificationIntent;
use serde_json::Value;
use tracing::info;

use crate::error::{DispatchError, DispatchResult};

/// Delivers one notification intent.
///
/// `Ok(())` marks the intent delivered. Any error counts as one failed
/// attempt and the intent is retried on a later poll.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn deliver(&self, intent: &NotificationIntent) -> DispatchResult<()>;
}

/// Writes every intent to the `tracing` log.
#[derive(Debug, Clone, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, intent: &NotificationIntent) -> DispatchResult<()> {
        let payload = parse_payload(intent)?;

        info!(
            id = %intent.id,
            user_id = %intent.user_id,
            kind = %intent.kind,
            product_id = intent.product_id.as_deref().unwrap_or("-"),
            payload = %payload,
            "Notification"
        );
        Ok(())
    }
}

/// Parses an intent's JSON body.
pub fn parse_payload(intent: &NotificationIntent) -> DispatchResult<Value> {
    serde_json::from_str(&intent.payload).map_err(|e| DispatchError::InvalidPayload {
        id: intent.id.clone(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kirana_core::NotificationKind;

    fn intent(payload: &str) -> NotificationIntent {
        NotificationIntent {
            id: "n-1".into(),
            user_id: "u-1".into(),
            kind: NotificationKind::BackInStock,
            product_id: Some("p-1".into()),
            payload: payload.into(),
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            attempted_at: None,
            delivered_at: None,
        }
    }

    #[tokio::test]
    async fn test_log_sink_accepts_json() {
        let sink = LogSink;
        assert_eq!(sink.name(), "log");
        sink.deliver(&intent(r#"{"productName":"Amul Butter"}"#))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_log_sink_rejects_bad_payload() {
        let err = LogSink.deliver(&intent("{not json")).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidPayload { .. }));
        assert!(!err.is_retryable());
    }
}
