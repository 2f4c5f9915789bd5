//! Gateway router and state assembly.

use axum::extract::DefaultBodyLimit;
use axum::routing::{any, post};
use axum::Router;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use tokenguard_types::GatewayConfig;

use crate::error::AppResult;
use crate::estimator::TokenEstimator;
use crate::gateway::{metered_handler, passthrough_handler, GatewayState, ReconcileQueue, UpstreamClient};
use crate::identity::IdentityResolver;
use crate::limiter::AdmissionController;

impl GatewayState {
    /// Build the state and spawn its reconciliation worker.
    pub fn from_config(
        config: &GatewayConfig,
        controller: Arc<AdmissionController>,
        resolver: Arc<IdentityResolver>,
    ) -> AppResult<(Self, JoinHandle<()>)> {
        let upstream = Arc::new(UpstreamClient::new(&config.upstream)?);
        let (reconciler, worker) =
            ReconcileQueue::spawn(Arc::clone(&controller), config.reconcile.queue_capacity);

        let state = Self {
            controller,
            resolver,
            estimator: TokenEstimator::from_config(&config.estimator),
            upstream,
            reconciler,
            body_limit: config.server.request_body_limit_bytes,
        };
        Ok((state, worker))
    }
}

fn valid_route(path: &str) -> bool {
    if path.starts_with('/') {
        return true;
    }
    tracing::warn!(path, "Ignoring route that does not start with '/'");
    false
}

/// Metered paths go through admission; passthrough paths are forwarded as is.
/// A path listed in both is metered.
pub fn build_gateway_router(
    state: GatewayState,
    metered_paths: &[String],
    passthrough_paths: &[String],
) -> Router {
    let mut router = Router::new();
    let mut seen = HashSet::new();

    for path in metered_paths.iter().filter(|p| valid_route(p)) {
        if seen.insert(path.as_str()) {
            router = router.route(path, post(metered_handler));
        }
    }
    for path in passthrough_paths.iter().filter(|p| valid_route(p)) {
        if seen.insert(path.as_str()) {
            router = router.route(path, any(passthrough_handler));
        }
    }

    tracing::info!(metered = ?metered_paths, passthrough = ?passthrough_paths, "Gateway routes registered");

    router
        .layer(DefaultBodyLimit::max(state.body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
