//! Caller-visible gateway errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which admission gate rejected a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeniedGate {
    /// Identity is serving a cooldown from an earlier violation
    Cooldown,
    /// Requests-per-minute ceiling
    RequestsPerMinute,
    /// Tokens-per-minute ceiling
    TokensPerMinute,
    /// Tokens-per-hour ceiling
    TokensPerHour,
    /// Rolling 24 hour token ceiling
    TokensPerDay,
}

impl DeniedGate {
    /// Stable label used in metrics and error bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cooldown => "cooldown",
            Self::RequestsPerMinute => "rpm",
            Self::TokensPerMinute => "tpm",
            Self::TokensPerHour => "tph",
            Self::TokensPerDay => "daily",
        }
    }
}

impl fmt::Display for DeniedGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors a gateway caller can receive.
///
/// Store failures are deliberately absent from the caller's view under the
/// default fail-open policy; `StoreUnavailable` is only produced when an
/// operator has switched fail-open off.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum GatewayError {
    /// Request body could not be parsed as a completion payload
    #[error("Malformed request: {message}")]
    MalformedRequest { message: String },

    /// One of the admission gates failed
    #[error("{reason}")]
    AdmissionDenied {
        gate: DeniedGate,
        reason: String,
        retry_after_secs: u64,
    },

    /// Upstream could not be reached (connect failure)
    #[error("Upstream unreachable: {message}")]
    UpstreamUnreachable { message: String },

    /// Upstream did not answer within the configured timeout
    #[error("Upstream timeout after {duration_secs}s")]
    UpstreamTimeout { duration_secs: u64 },

    /// Any other transport failure talking to the upstream
    #[error("Upstream error: {message}")]
    Upstream { message: String },

    /// Usage store unavailable while fail-open is disabled
    #[error("Usage store unavailable: {message}")]
    StoreUnavailable { message: String },
}

impl GatewayError {
    /// Get HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::MalformedRequest { .. } => 400,
            Self::AdmissionDenied { .. } => 429,
            Self::UpstreamUnreachable { .. } | Self::StoreUnavailable { .. } => 503,
            Self::UpstreamTimeout { .. } => 504,
            Self::Upstream { .. } => 502,
        }
    }

    /// OpenAI-style `error.type` string.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::MalformedRequest { .. } => "invalid_request_error",
            Self::AdmissionDenied { .. } => "rate_limit_exceeded",
            Self::UpstreamUnreachable { .. } => "upstream_unreachable",
            Self::UpstreamTimeout { .. } => "upstream_timeout",
            Self::Upstream { .. } => "upstream_error",
            Self::StoreUnavailable { .. } => "usage_store_unavailable",
        }
    }

    /// Whether a caller may retry immediately at its own discretion.
    ///
    /// Malformed requests and denials need a changed request or a wait.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnreachable { .. }
                | Self::UpstreamTimeout { .. }
                | Self::Upstream { .. }
                | Self::StoreUnavailable { .. }
        )
    }

    /// Seconds to advertise in `Retry-After`, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::AdmissionDenied { retry_after_secs, .. } => Some(*retry_after_secs),
            _ => None,
        }
    }
}
