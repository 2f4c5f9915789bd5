//! Operator API Routes
//!
//! Everything under `/api`. The admin-key middleware in [`auth`] wraps the
//! whole router when `admin.api_key` is configured.

pub mod auth;
mod credentials;
mod identities;
mod limits;
mod metrics;
mod stats;
mod tokens;


use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use serde::Serialize;

use tokenguard_core::identity::validate_identity;
use tokenguard_core::store::StoreError;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        // Status
        .route("/status", get(get_status))
        // Usage statistics
        .route("/stats", get(stats::get_statistics))
        .route("/stats/:identity", get(stats::get_identity_stats))
        .route("/top", get(stats::get_top))
        // Identities
        .route("/identities", get(identities::list_identities))
        .route("/identities/:identity/history", get(identities::get_history))
        .route("/identities/:identity/reset", post(identities::reset_identity))
        // Limits & credentials
        .route("/limits", put(limits::replace_limits))
        .route("/credentials/reload", post(credentials::reload_credentials))
        // Token helpers
        .route("/tokens/estimate", get(tokens::estimate_tokens))
        .route("/tokens/cost", post(tokens::estimate_cost))
        // Prometheus metrics
        .route("/metrics", get(metrics::get_metrics))
        // API fallback: return 404 for unknown API endpoints
        .fallback(api_not_found)
}

async fn api_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "Not found"})))
}

pub(crate) type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

pub(crate) fn store_failure(err: &StoreError) -> (StatusCode, String) {
    tracing::error!(error = %err, "Usage store request failed");
    (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
}

pub(crate) fn checked_identity(identity: &str) -> Result<(), (StatusCode, String)> {
    if validate_identity(identity) {
        Ok(())
    } else {
        Err((StatusCode::BAD_REQUEST, format!("Invalid identity: {identity}")))
    }
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub storage_backend: String,
    pub identities_count: usize,
    pub upstream_url: String,
    pub fail_open: bool,
    pub started_at: String,
    pub uptime_secs: u64,
}

pub async fn get_status(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    let controller = state.controller();
    let identities = controller.list_identities().await.map_err(|e| store_failure(&e))?;

    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage_backend: controller.store().backend_name().to_string(),
        identities_count: identities.len(),
        upstream_url: state.upstream().base_url().to_string(),
        fail_open: controller.fail_open(),
        started_at: state.inner.started_at_rfc3339.clone(),
        uptime_secs: state.uptime_secs(),
    }))
}
