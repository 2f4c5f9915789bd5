use axum::{
    extract::State, http::StatusCode, middleware, response::IntoResponse, routing::get, Router,
};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::api::auth::{admin_auth_middleware, AdminKey};
use crate::state::AppState;

/// Operator API and health routes, merged with the gateway routes.
pub fn build_router(state: AppState) -> Router {
    let gateway_router = state.build_gateway_router();

    let admin_key = AdminKey::new(state.config().admin.api_key.as_deref());
    if admin_key.0.is_none() {
        tracing::warn!("admin.api_key is not set; the operator API at /api is unauthenticated");
    }

    let protected_api = Router::<AppState>::new()
        .nest("/api", api::router())
        .layer(middleware::from_fn_with_state(admin_key, admin_auth_middleware));

    let public_routes = Router::<AppState>::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check));

    // the gateway router carries its own body limit and trace layer
    protected_api
        .merge(public_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(gateway_router)
}

/// Always 200; upstream reachability is reported, not enforced.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let upstream = state.upstream();
    let connected = upstream.probe_health().await;

    (
        StatusCode::OK,
        axum::Json(serde_json::json!({
            "status": "ok",
            "gateway": "running",
            "version": env!("CARGO_PKG_VERSION"),
            "storage_backend": state.controller().store().backend_name(),
            "upstream": {
                "url": upstream.base_url(),
                "status": if connected { "connected" } else { "disconnected" },
            },
        })),
    )
}
