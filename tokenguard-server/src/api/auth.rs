//! Admin-key guard for `/api/*`.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Expected admin key; `None` leaves the API open.
#[derive(Clone, Default)]
pub struct AdminKey(pub Option<Arc<str>>);

impl AdminKey {
    pub fn new(key: Option<&str>) -> Self {
        Self(key.filter(|k| !k.is_empty()).map(Arc::from))
    }
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn presented_key(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .or_else(|| request.headers().get("x-api-key").and_then(|h| h.to_str().ok()))
}

pub async fn admin_auth_middleware(
    State(expected): State<AdminKey>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = expected.0.as_deref() else {
        return Ok(next.run(request).await);
    };

    if presented_key(&request).is_some_and(|k| constant_time_compare(k, expected)) {
        return Ok(next.run(request).await);
    }

    tracing::warn!(path = %request.uri().path(), "Rejected operator API request without a valid admin key");
    Err(StatusCode::UNAUTHORIZED)
}
