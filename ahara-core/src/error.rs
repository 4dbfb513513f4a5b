//! Error types for the Ahara engine

use thiserror::Error;

/// Result type alias using Ahara's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Ahara engine
///
/// An empty category or an empty search result is never an error; callers
/// receive an empty list for those. Everything here is a genuine failure.
#[derive(Debug, Error)]
pub enum Error {
    // ============ Request Errors ============
    /// Malformed profile, query or record
    #[error("Validation error on `{field}`: {message}")]
    Validation {
        /// Offending field
        field: String,
        /// What is wrong with it
        message: String,
    },

    // ============ Store Errors ============
    /// Backing store or index unreachable
    #[error("Knowledge store unavailable: {0}")]
    StoreUnavailable(String),

    /// Bounded wait exceeded
    #[error("Timeout: {operation} exceeded {timeout_ms}ms")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Configured bound in milliseconds
        timeout_ms: u64,
    },

    // ============ Configuration Errors ============
    /// Policy or engine configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML policy could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ============ System Errors ============
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new store unavailable error
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Check if this error is retryable
    ///
    /// Only store connectivity is retried. Filtering and scoring are pure and
    /// a timeout has already consumed the caller's budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}
