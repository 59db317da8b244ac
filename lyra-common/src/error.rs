//! Common error types for Lyra
//!
//! Every component maps its internal failures into exactly one of these kinds
//! at its public boundary. Only [`Error::TransientProvider`] is considered
//! retryable by the transcription retry loop.

use thiserror::Error;

/// Common result type for Lyra operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across Lyra services
#[derive(Error, Debug)]
pub enum Error {
    /// Bad caller input (client fault, never retried)
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Requested resource not found
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// Database operation error (server fault, caller may retry the whole operation)
    #[error("Database error during {operation}: {reason}")]
    Database { operation: String, reason: String },

    /// Actor lacks ownership of the resource
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Transcription/embedding/vector-index failure classified as retryable
    #[error("Transient provider error: {0}")]
    TransientProvider(String),

    /// Provider rejected the request (not retryable)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Audio download failed (non-2xx or network failure)
    #[error("Audio fetch failed: {0}")]
    AudioFetch(String),

    /// Cooperative cancellation aborted the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn database(operation: impl Into<String>, reason: impl ToString) -> Self {
        Error::Database {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// True for provider failures worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientProvider(_))
    }

    /// True when sqlite reported lock contention
    pub fn is_lock_contention(&self) -> bool {
        match self {
            Error::Database { reason, .. } => reason.contains("database is locked"),
            _ => false,
        }
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::database("query", err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(format!("JSON error: {}", err))
    }
}
