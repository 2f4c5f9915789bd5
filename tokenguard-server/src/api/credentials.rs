//! Credential reload handler

use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;

use tokenguard_core::identity::IdentityError;

use super::ApiResult;
use crate::state::AppState;

#[derive(Serialize)]
pub struct ReloadResponse {
    pub users: usize,
    pub credentials: usize,
    pub profiles_applied: usize,
}

/// Re-read the users file, swap credentials and re-apply its limit profiles.
pub async fn reload_credentials(State(state): State<AppState>) -> ApiResult<ReloadResponse> {
    let resolver = state.resolver().clone();
    let summary = tokio::task::spawn_blocking(move || resolver.reload())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("spawn_blocking panicked: {e}")))?
        .map_err(|e| {
            let status = match e {
                IdentityError::NoUsersFile => StatusCode::CONFLICT,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            };
            tracing::warn!(error = %e, "Credential reload failed; keeping previous snapshot");
            (status, e.to_string())
        })?;

    let profiles_applied = state
        .controller()
        .limits()
        .replace_profiles(summary.profiles, summary.default_limits);

    Ok(Json(ReloadResponse {
        users: summary.users,
        credentials: summary.credentials,
        profiles_applied,
    }))
}
