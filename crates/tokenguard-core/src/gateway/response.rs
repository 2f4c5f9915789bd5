//! Error bodies and observability headers.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::time::Duration;
use tokenguard_types::GatewayError;

pub const PROCESS_TIME_HEADER: HeaderName = HeaderName::from_static("x-process-time-ms");
pub const IDENTITY_HEADER: HeaderName = HeaderName::from_static("x-user-id");
pub const ESTIMATE_HEADER: HeaderName = HeaderName::from_static("x-estimated-tokens");
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// A request rejected before or while talking to the upstream.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub error: GatewayError,
    pub identity: Option<String>,
    pub estimated_tokens: Option<u64>,
}

impl Rejection {
    pub fn new(error: GatewayError) -> Self {
        Self { error, identity: None, estimated_tokens: None }
    }

    pub fn for_identity(mut self, identity: &str) -> Self {
        self.identity = Some(identity.to_string());
        self
    }

    pub fn with_estimate(mut self, estimate: u64) -> Self {
        self.estimated_tokens = Some(estimate);
        self
    }

    /// Metrics outcome label.
    pub fn outcome(&self) -> &'static str {
        match &self.error {
            GatewayError::MalformedRequest { .. } => "malformed",
            GatewayError::AdmissionDenied { .. } => "denied",
            GatewayError::StoreUnavailable { .. } => "store_unavailable",
            GatewayError::UpstreamUnreachable { .. }
            | GatewayError::UpstreamTimeout { .. }
            | GatewayError::Upstream { .. } => "upstream_error",
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut error = json!({
            "message": self.error.to_string(),
            "type": self.error.error_type(),
        });
        if let GatewayError::AdmissionDenied { gate, retry_after_secs, .. } = &self.error {
            error["code"] = json!(gate.as_str());
            error["retry_after_secs"] = json!(retry_after_secs);
        }
        if let Some(identity) = &self.identity {
            error["user_id"] = json!(identity);
        }
        if let Some(estimate) = self.estimated_tokens {
            error["estimated_tokens"] = json!(estimate);
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();
        if let Some(secs) = self.error.retry_after_secs() {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Observability headers attached to every gateway response.
#[derive(Debug, Clone, Default)]
pub struct ResponseTags {
    pub request_id: String,
    pub identity: Option<String>,
    pub estimated_tokens: Option<u64>,
}

impl ResponseTags {
    pub fn apply(&self, headers: &mut HeaderMap, elapsed: Duration) {
        if let Ok(value) = HeaderValue::from_str(&elapsed.as_millis().to_string()) {
            headers.insert(PROCESS_TIME_HEADER, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.request_id) {
            headers.insert(REQUEST_ID_HEADER, value);
        }
        if let Some(identity) = &self.identity {
            // identities may contain Hangul; header values must stay ASCII
            let encoded: String = url::form_urlencoded::byte_serialize(identity.as_bytes()).collect();
            if let Ok(value) = HeaderValue::from_str(&encoded) {
                headers.insert(IDENTITY_HEADER, value);
            }
        }
        if let Some(estimate) = self.estimated_tokens {
            headers.insert(ESTIMATE_HEADER, HeaderValue::from(estimate));
        }
    }
}
