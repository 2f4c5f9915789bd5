//! Identity listing, history and reset handlers

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};

use tokenguard_types::models::UsageEntry;

use super::{checked_identity, store_failure, ApiResult};
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 100;
const MAX_HISTORY_LIMIT: usize = 10_000;

#[derive(Serialize)]
pub struct IdentitySummary {
    pub identity: String,
    pub display_name: String,
}

/// Identities seen by the store plus those declared in the users file.
pub async fn list_identities(State(state): State<AppState>) -> ApiResult<Vec<IdentitySummary>> {
    let mut identities = state.controller().list_identities().await.map_err(|e| store_failure(&e))?;
    let credentials = state.resolver().snapshot();
    identities.extend(credentials.identities());
    identities.sort();
    identities.dedup();

    let summaries = identities
        .into_iter()
        .map(|identity| IdentitySummary {
            display_name: credentials.display_name(&identity).to_string(),
            identity,
        })
        .collect();
    Ok(Json(summaries))
}

#[derive(Deserialize, Default)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(identity): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<UsageEntry>> {
    checked_identity(&identity)?;
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).min(MAX_HISTORY_LIMIT);
    let entries =
        state.controller().history(&identity, limit).await.map_err(|e| store_failure(&e))?;
    Ok(Json(entries))
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub identity: String,
    pub reset: bool,
}

pub async fn reset_identity(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> ApiResult<ResetResponse> {
    checked_identity(&identity)?;
    state.controller().reset(&identity).await.map_err(|e| store_failure(&e))?;
    Ok(Json(ResetResponse { identity, reset: true }))
}
