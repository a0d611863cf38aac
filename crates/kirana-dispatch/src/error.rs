//! # Dispatch Error Types
//!
//! Error types for configuration loading and notification dispatch.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Dispatch Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Delivery     │  │     Database            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  SinkFailed     │  │  Database(DbError)      │ │
//! │  │  ConfigLoad     │  │  InvalidPayload │  │                         │ │
//! │  │  ConfigSave     │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │    Internal     │                                                   │
//! │  │                 │                                                   │
//! │  │  ChannelError   │                                                   │
//! │  │  ShuttingDown   │                                                   │
//! │  └─────────────────┘                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use kirana_db::DbError;
use thiserror::Error;

/// Result type alias for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// A config value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Delivery Errors
    // =========================================================================
    /// The sink could not deliver an intent. Counted as one failed attempt.
    #[error("Delivery failed for {id}: {reason}")]
    SinkFailed { id: String, reason: String },

    /// The intent's JSON payload does not parse.
    #[error("Invalid payload for {id}: {reason}")]
    InvalidPayload { id: String, reason: String },

    // =========================================================================
    // Database Errors
    // =========================================================================
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Dispatcher is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for DispatchError {
    fn from(err: std::io::Error) -> Self {
        DispatchError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for DispatchError {
    fn from(err: toml::de::Error) -> Self {
        DispatchError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for DispatchError {
    fn from(err: toml::ser::Error) -> Self {
        DispatchError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl DispatchError {
    /// Returns true if a later poll may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::SinkFailed { .. } => true,
            DispatchError::Database(db) => matches!(
                db,
                DbError::ConnectionFailed(_) | DbError::PoolExhausted | DbError::QueryFailed(_)
            ),
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            DispatchError::InvalidConfig(_)
                | DispatchError::ConfigLoadFailed(_)
                | DispatchError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        let sink = DispatchError::SinkFailed {
            id: "n-1".into(),
            reason: "push gateway 503".into(),
        };
        assert!(sink.is_retryable());
        assert!(!DispatchError::InvalidConfig("batch_size".into()).is_retryable());
        assert!(!DispatchError::InvalidPayload {
            id: "n-1".into(),
            reason: "EOF".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_config_errors() {
        assert!(DispatchError::ConfigLoadFailed("missing".into()).is_config_error());
        assert!(!DispatchError::ShuttingDown.is_config_error());
    }

    #[test]
    fn test_error_display() {
        let err = DispatchError::SinkFailed {
            id: "n-42".into(),
            reason: "timeout".into(),
        };
        assert_eq!(err.to_string(), "Delivery failed for n-42: timeout");
    }
}
