//! Error types for the emobench harness.

use thiserror::Error;

use crate::disorder::Disorder;

/// A shared error type for the entire harness.
///
/// Provides typed, structured error variants with automatic conversion
/// from common error types via the `From` trait.
#[derive(Error, Debug)]
pub enum EmobenchError {
    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend request failure. `transient` marks server-side conditions
    /// that are worth one more attempt.
    #[error("Backend error: {message}")]
    Backend { message: String, transient: bool },

    /// A single test administration produced empty or unparseable output.
    /// Recoverable: the administration is retried up to its attempt limit.
    #[error("Invalid test result: {0}")]
    InvalidTestResult(String),

    /// Test administration exhausted its retry budget.
    #[error("Failed to retrieve valid {disorder} test results after {attempts} attempts")]
    TestAdministration { disorder: Disorder, attempts: u32 },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EmobenchError {
    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a transient backend error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            transient: true,
        }
    }

    /// Creates a permanent backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            transient: false,
        }
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether another attempt at the same operation may succeed.
    ///
    /// Transient backend conditions (server errors, timeouts) and
    /// malformed single test administrations are retryable; everything
    /// else propagates immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Backend {
                transient: true,
                ..
            } | Self::InvalidTestResult(_)
        )
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a config error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl From<std::io::Error> for EmobenchError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for EmobenchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for EmobenchError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, EmobenchError>`.
pub type Result<T> = std::result::Result<T, EmobenchError>;
