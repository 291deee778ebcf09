//! Error types for the Pinecone target.
//!
//! This module defines a unified error enum covering configuration, I/O,
//! vector-store, readiness, record and protocol failures.

use thiserror::Error;

/// Unified error type for the Pinecone target.
///
/// All functions return `Result<T, AppError>`. Nothing is retried or
/// swallowed locally; every error aborts the sync.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors (stdin, stdout, config files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Vector store gateway errors (network, HTTP status, decoding)
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// Index did not report ready within the maximum wait
    #[error("Index `{index}` not ready after {elapsed_secs} seconds, status is {status}")]
    IndexNotReady {
        index: String,
        status: String,
        elapsed_secs: u64,
    },

    /// Input record could not be turned into a vector
    #[error("Record error: {0}")]
    Record(String),

    /// Malformed input message from the stream
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
