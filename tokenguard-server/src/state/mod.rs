//! Application State
//!
//! Shared handles for the operator API and the gateway routes.

use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

use tokenguard_core::gateway::UpstreamClient;
use tokenguard_core::{
    build_gateway_router, AdmissionController, GatewayState, IdentityResolver, TokenEstimator,
};
use tokenguard_types::GatewayConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub(crate) inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
    pub config: GatewayConfig,
    pub gateway: GatewayState,
    pub started_at: Instant,
    pub started_at_rfc3339: String,
}

impl AppState {
    /// Assemble the gateway state; the returned handle is the reconciliation worker.
    pub fn new(
        config: GatewayConfig,
        controller: Arc<AdmissionController>,
        resolver: Arc<IdentityResolver>,
    ) -> Result<(Self, JoinHandle<()>)> {
        let (gateway, worker) = GatewayState::from_config(&config, controller, resolver)?;
        let state = Self {
            inner: Arc::new(AppStateInner {
                config,
                gateway,
                started_at: Instant::now(),
                started_at_rfc3339: chrono::Utc::now().to_rfc3339(),
            }),
        };
        Ok((state, worker))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    pub fn controller(&self) -> &Arc<AdmissionController> {
        &self.inner.gateway.controller
    }

    pub fn resolver(&self) -> &Arc<IdentityResolver> {
        &self.inner.gateway.resolver
    }

    pub fn estimator(&self) -> TokenEstimator {
        self.inner.gateway.estimator
    }

    pub fn upstream(&self) -> &Arc<UpstreamClient> {
        &self.inner.gateway.upstream
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }

    pub fn build_gateway_router(&self) -> Router {
        let upstream = &self.inner.config.upstream;
        build_gateway_router(
            self.inner.gateway.clone(),
            &upstream.metered_paths,
            &upstream.passthrough_paths,
        )
    }
}
