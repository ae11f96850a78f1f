//! Error types for warden operations

use std::time::Duration;
use thiserror::Error;

/// Key-value store errors.
///
/// These never cross the `KeyValueStore` facade: the facade converts them
/// into fallback reads/writes or neutral results. Backends and the rate
/// limiter's remote path are the only places that see them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("No remote store configured")]
    NotConfigured,

    #[error("Connection to remote store failed: {reason}")]
    Connection { reason: String },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Command {command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("Operation against a key holding the wrong kind of value: {key}")]
    WrongType { key: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },
}

impl StoreError {
    /// Transient connectivity failures are recovered through the fallback
    /// map; everything else is a definite answer from a reachable store.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::NotConfigured | StoreError::Connection { .. } | StoreError::Timeout { .. }
        )
    }

    pub fn connection(reason: impl Into<String>) -> Self {
        StoreError::Connection {
            reason: reason.into(),
        }
    }

    pub fn command(command: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Command {
            command: command.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization {
            reason: e.to_string(),
        }
    }
}

/// Validation errors. These indicate a programming mistake at the call
/// site, not an environmental failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ValidationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all warden errors.
#[derive(Debug, Clone, Error)]
pub enum WardenError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for warden operations.
pub type WardenResult<T> = Result<T, WardenError>;

/// Result type alias for raw store backend operations.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::NotConfigured.is_transient());
        assert!(StoreError::connection("refused").is_transient());
        assert!(StoreError::Timeout {
            operation: "GET",
            after: Duration::from_secs(5),
        }
        .is_transient());

        assert!(!StoreError::command("INCRBY", "not an integer").is_transient());
        assert!(!StoreError::WrongType {
            key: "k".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Timeout {
            operation: "ZADD",
            after: Duration::from_millis(250),
        };
        let msg = err.to_string();
        assert!(msg.contains("ZADD"));
        assert!(msg.contains("250ms"));
    }

    #[test]
    fn test_warden_error_from_validation() {
        let err: WardenError = ValidationError::invalid("ttl", "must be positive").into();
        assert!(matches!(err, WardenError::Validation(_)));
        assert!(err.to_string().contains("ttl"));
    }

    #[test]
    fn test_serde_error_converts_to_serialization() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: StoreError = parse.expect_err("malformed json should fail").into();
        assert!(matches!(err, StoreError::Serialization { .. }));
    }
}
