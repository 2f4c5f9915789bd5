//! Usage statistics handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};

use tokenguard_types::{IdentityStatus, TopEntry, UsagePeriod, UsageStatistics};

use super::{checked_identity, store_failure, ApiResult};
use crate::state::AppState;

const DEFAULT_TOP_LIMIT: usize = 10;
const MAX_TOP_LIMIT: usize = 1000;

pub async fn get_statistics(State(state): State<AppState>) -> ApiResult<UsageStatistics> {
    let stats = state.controller().statistics().await.map_err(|e| store_failure(&e))?;
    Ok(Json(stats))
}

#[derive(Serialize)]
pub struct IdentityStatsResponse {
    pub display_name: String,
    #[serde(flatten)]
    pub status: IdentityStatus,
}

pub async fn get_identity_stats(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> ApiResult<IdentityStatsResponse> {
    checked_identity(&identity)?;
    let status = state.controller().status(&identity).await.map_err(|e| store_failure(&e))?;
    Ok(Json(IdentityStatsResponse { display_name: state.resolver().display_name(&identity), status }))
}

#[derive(Deserialize, Default)]
pub struct TopQuery {
    pub limit: Option<usize>,
    pub period: Option<String>,
}

#[derive(Serialize)]
pub struct TopResponse {
    pub period: UsagePeriod,
    pub entries: Vec<TopEntry>,
}

pub async fn get_top(
    State(state): State<AppState>,
    Query(query): Query<TopQuery>,
) -> ApiResult<TopResponse> {
    let period = match query.period.as_deref() {
        Some(raw) => raw.parse::<UsagePeriod>().map_err(|e| (StatusCode::BAD_REQUEST, e))?,
        None => UsagePeriod::Today,
    };
    let limit = query.limit.unwrap_or(DEFAULT_TOP_LIMIT).clamp(1, MAX_TOP_LIMIT);

    let entries = state.controller().top(limit, period).await.map_err(|e| store_failure(&e))?;
    Ok(Json(TopResponse { period, entries }))
}
