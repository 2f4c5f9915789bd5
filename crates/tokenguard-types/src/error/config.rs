//! Configuration-related errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading configuration or the users file.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum ConfigError {
    /// Config file not found at expected path
    #[error("Config not found: {path}")]
    NotFound {
        /// Filesystem path where config was expected
        path: String,
    },

    /// Config file could not be read
    #[error("Config read error for {path}: {message}")]
    ReadError {
        /// Filesystem path that failed to read
        path: String,
        /// Description of the I/O failure
        message: String,
    },

    /// Config file parse error (JSON)
    #[error("Config parse error: {message}")]
    ParseError {
        /// Description of the parse failure
        message: String,
    },

    /// Config validation error (invalid values)
    #[error("Config validation error for {field}: {message}")]
    ValidationError {
        /// Name of the field that failed validation
        field: String,
        /// Description of the validation failure
        message: String,
    },
}

impl ConfigError {
    /// Create a parse error from a serde_json error.
    pub fn from_json_error(e: &serde_json::Error) -> Self {
        Self::ParseError { message: e.to_string() }
    }

    /// Create a read error from an IO error.
    pub fn from_io_error(path: &str, e: &std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            return Self::NotFound { path: path.to_string() };
        }
        Self::ReadError { path: path.to_string(), message: e.to_string() }
    }

    /// Flatten `validator` errors into the first offending dotted field path.
    pub fn from_validation(errors: &validator::ValidationErrors) -> Self {
        first_field_error(errors, "").unwrap_or_else(|| Self::ValidationError {
            field: "config".to_string(),
            message: errors.to_string(),
        })
    }
}

fn first_field_error(errors: &validator::ValidationErrors, prefix: &str) -> Option<ConfigError> {
    use validator::ValidationErrorsKind;

    for (name, kind) in errors.errors() {
        let path = if prefix.is_empty() { name.to_string() } else { format!("{prefix}.{name}") };
        let found = match kind {
            ValidationErrorsKind::Field(errs) => errs.first().map(|e| ConfigError::ValidationError {
                field: path.clone(),
                message: e
                    .message
                    .as_ref()
                    .map_or_else(|| e.code.to_string(), ToString::to_string),
            }),
            ValidationErrorsKind::Struct(inner) => first_field_error(inner, &path),
            ValidationErrorsKind::List(items) => {
                items.values().find_map(|inner| first_field_error(inner, &path))
            },
        };
        if found.is_some() {
            return found;
        }
    }
    None
}
