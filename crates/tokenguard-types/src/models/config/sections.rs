//! Individual configuration sections.

use crate::models::LimitProfile;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

use super::enums::StorageBackend;

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host
    #[validate(length(min = 1_u64))]
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Maximum accepted request body
    #[validate(range(min = 1024_usize))]
    pub request_body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_body_limit_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Backend model server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL, e.g. `http://localhost:8000`
    #[validate(url)]
    pub url: String,
    /// Whole-request timeout in seconds
    #[validate(range(min = 1_u64, max = 3600_u64))]
    pub timeout_secs: u64,
    /// TCP connect timeout in seconds
    #[validate(range(min = 1_u64, max = 300_u64))]
    pub connect_timeout_secs: u64,
    /// Paths that go through admission control
    pub metered_paths: Vec<String>,
    /// Paths forwarded without admission
    pub passthrough_paths: Vec<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 5,
            metered_paths: vec!["/v1/chat/completions".to_string(), "/v1/completions".to_string()],
            passthrough_paths: vec!["/v1/models".to_string()],
        }
    }
}

impl UpstreamConfig {
    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

/// Usage store selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SQLite database file; `None` means `<data dir>/tokenguard/usage.db`
    pub sqlite_path: Option<PathBuf>,
    /// Connections in the SQLite pool
    #[validate(range(min = 1_usize, max = 64_usize))]
    pub sqlite_connections: usize,
    /// Interval of the expired-entry sweep
    #[validate(range(min = 1_u64))]
    pub sweep_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            sqlite_path: None,
            sqlite_connections: 4,
            sweep_interval_secs: 300,
        }
    }
}

/// Default limit profile and failure policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct LimitsConfig {
    /// Profile for identities without an explicit one
    #[validate(nested)]
    pub default: LimitProfile,
    /// Allow requests when the usage store errors
    pub fail_open: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { default: LimitProfile::default(), fail_open: true }
    }
}

/// Token estimator tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Weight of one Hangul syllable
    #[validate(range(min = 0.0_f64, max = 16.0_f64))]
    pub korean_factor: f64,
    /// Output budget assumed when a request omits `max_tokens`
    pub default_max_tokens: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self { korean_factor: 1.2, default_max_tokens: 100 }
    }
}

/// Caller identification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct IdentityConfig {
    /// Identity used when nothing identifies the caller
    #[validate(length(min = 1_u64, max = 50_u64))]
    pub anonymous_identity: String,
    /// Header carrying an explicit identity
    #[validate(length(min = 1_u64))]
    pub identity_header: String,
    /// Header carrying a credential (alternative to bearer auth)
    #[validate(length(min = 1_u64))]
    pub credential_header: String,
    /// Users file with credentials, display names and limit profiles
    pub users_file: Option<PathBuf>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            anonymous_identity: "anonymous".to_string(),
            identity_header: "x-user-id".to_string(),
            credential_header: "x-api-key".to_string(),
            users_file: None,
        }
    }
}

/// Background reconciliation queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct ReconcileConfig {
    #[validate(range(min = 1_usize))]
    pub queue_capacity: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { queue_capacity: 1024 }
    }
}

/// Operator API protection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct AdminConfig {
    /// When set, `/api/*` requires this key
    pub api_key: Option<String>,
}

/// Log sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive
    pub level: String,
    /// Daily-rolling log file, in addition to stdout
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), file: None }
    }
}
