//! Token estimate and cost helpers

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};

use tokenguard_types::CostEstimate;

use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct EstimateQuery {
    #[serde(default)]
    pub text: String,
    pub max_tokens: Option<u64>,
}

#[derive(Serialize)]
pub struct EstimateResponse {
    pub characters: usize,
    pub estimated_tokens: u64,
    pub output_budget: u64,
    /// What the gate would charge: estimate plus output budget
    pub admission_estimate: u64,
}

pub async fn estimate_tokens(
    State(state): State<AppState>,
    Query(query): Query<EstimateQuery>,
) -> Json<EstimateResponse> {
    let estimator = state.estimator();
    let estimated_tokens = estimator.estimate_text(&query.text);
    let output_budget = query.max_tokens.unwrap_or_else(|| estimator.default_max_tokens());

    Json(EstimateResponse {
        characters: query.text.chars().count(),
        estimated_tokens,
        output_budget,
        admission_estimate: estimated_tokens.saturating_add(output_budget),
    })
}

#[derive(Deserialize)]
pub struct CostRequest {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

#[derive(Serialize)]
pub struct CostResponse {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(flatten)]
    pub cost: CostEstimate,
}

pub async fn estimate_cost(
    State(state): State<AppState>,
    Json(payload): Json<CostRequest>,
) -> Json<CostResponse> {
    let cost = state.config().pricing.estimate(payload.input_tokens, payload.output_tokens);
    Json(CostResponse { input_tokens: payload.input_tokens, output_tokens: payload.output_tokens, cost })
}
