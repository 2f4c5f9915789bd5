//! Unified error types for TokenGuard Core.

use serde::Serialize;
use thiserror::Error;

use crate::identity::IdentityError;
use crate::store::StoreError;

/// Main error type for gateway assembly and operator actions.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AppError {
    /// Usage store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Users file or credential reload failed.
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Config(#[from] tokenguard_types::ConfigError),

    /// Network request failed (HTTP client).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// File system I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

/// Result type alias for TokenGuard operations.
pub type AppResult<T> = Result<T, AppError>;
