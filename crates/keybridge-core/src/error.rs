//! Unified error types for Keybridge Core.

use serde::Serialize;
use thiserror::Error;

/// Main error type for all relay operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AppError {
    /// Network request failed (HTTP client).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// File system I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// OAuth token fetch could not produce a credential
    /// (network, timeout, non-2xx, malformed response, missing field).
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

/// Result type alias for relay operations.
pub type AppResult<T> = Result<T, AppError>;
