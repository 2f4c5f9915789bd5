//! TokenGuard Server - Headless Daemon
//!
//! A token-aware admission gateway that:
//! - Meters completion requests on the configured paths and forwards them upstream
//! - Forwards passthrough paths (e.g. `/v1/models`) untouched
//! - Provides an operator REST API on /api/*
//!
//! Access via: http://localhost:8080

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod api;
mod cli;
mod config;
mod logging;
mod router;
mod server_utils;
mod state;
#[cfg(test)]
mod test_helpers;

use cli::{Cli, Commands};
use state::AppState;
use tokenguard_core::{
    open_store, AdmissionController, Clock, IdentityResolver, LimitRegistry, SystemClock,
    TokenEstimator,
};
use tokenguard_types::GatewayConfig;

const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(&cli)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {},
        Commands::Estimate { text, max_tokens } => {
            print_estimate(&config, &text, max_tokens);
            return Ok(());
        },
        Commands::CheckConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            return Ok(());
        },
    }

    let _log_guard = logging::init_logging(&config.logging)?;
    serve(config).await
}

fn print_estimate(config: &GatewayConfig, text: &str, max_tokens: Option<u64>) {
    let estimator = TokenEstimator::from_config(&config.estimator);
    let input = estimator.estimate_text(text);
    let budget = max_tokens.unwrap_or_else(|| estimator.default_max_tokens());
    println!("characters:         {}", text.chars().count());
    println!("estimated tokens:   {input}");
    println!("output budget:      {budget}");
    println!("admission estimate: {}", input.saturating_add(budget));
}

async fn serve(config: GatewayConfig) -> Result<()> {
    info!("TokenGuard v{} starting on {}", env!("CARGO_PKG_VERSION"), config.socket_addr());

    tokenguard_core::metrics::init_metrics()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(&config.storage, Arc::clone(&clock))?;

    let (resolver, users_file) = IdentityResolver::from_config(&config.identity)?;
    let limits = LimitRegistry::new(config.limits.default.clone());
    if let Some(file) = users_file {
        let applied = limits.replace_profiles(file.profiles(), file.default_limits.clone());
        info!(users = file.users.len(), profiles = applied, "Users file loaded");
    }

    let controller = Arc::new(
        AdmissionController::new(store, limits, clock).with_fail_open(config.limits.fail_open),
    );
    if !controller.fail_open() {
        info!("Fail-open disabled: usage store failures reject requests with 503");
    }

    let sweep = server_utils::spawn_sweep_task(
        Arc::clone(&controller),
        Duration::from_secs(config.storage.sweep_interval_secs),
    );

    let listener = tokio::net::TcpListener::bind(config.socket_addr()).await?;
    let upstream_url = config.upstream.base_url().to_string();
    let (state, reconcile_worker) = AppState::new(config, controller, Arc::new(resolver))?;
    let app = router::build_router(state);

    info!("Gateway listening on http://{}", listener.local_addr()?);
    info!("Forwarding to upstream {upstream_url}");

    axum::serve(listener, app).with_graceful_shutdown(server_utils::shutdown_signal()).await?;

    sweep.abort();
    // the router held the last queue senders; let pending reconciliations land
    if tokio::time::timeout(WORKER_DRAIN_TIMEOUT, reconcile_worker).await.is_err() {
        tracing::warn!("Reconciliation worker did not drain in time");
    }
    info!("TokenGuard stopped");
    Ok(())
}
