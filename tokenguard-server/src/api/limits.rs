//! Limit profile handlers

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use tokenguard_types::{ConfigError, LimitProfile};

use super::{checked_identity, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ReplaceLimitsRequest {
    #[serde(default)]
    pub default: Option<LimitProfile>,
    #[serde(default)]
    pub profiles: HashMap<String, LimitProfile>,
}

#[derive(Serialize)]
pub struct ReplaceLimitsResponse {
    pub profiles_applied: usize,
    pub default: LimitProfile,
}

fn validate_profile(name: &str, profile: &LimitProfile) -> Result<(), (StatusCode, String)> {
    profile.validate().map_err(|e| {
        let detail = ConfigError::from_validation(&e);
        (StatusCode::BAD_REQUEST, format!("Invalid profile '{name}': {detail}"))
    })
}

/// Replace every per-identity profile at once; the optional default too.
pub async fn replace_limits(
    State(state): State<AppState>,
    Json(payload): Json<ReplaceLimitsRequest>,
) -> ApiResult<ReplaceLimitsResponse> {
    for (identity, profile) in &payload.profiles {
        checked_identity(identity)?;
        validate_profile(identity, profile)?;
    }
    if let Some(default) = &payload.default {
        validate_profile("default", default)?;
    }

    let limits = state.controller().limits();
    let profiles_applied = limits.replace_profiles(payload.profiles, payload.default);
    Ok(Json(ReplaceLimitsResponse { profiles_applied, default: limits.default_profile() }))
}
