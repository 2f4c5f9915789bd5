//! Test helpers for tokenguard-server unit tests.

use std::sync::Arc;

use tokenguard_core::identity::CredentialMap;
use tokenguard_core::store::MemoryUsageStore;
use tokenguard_core::{AdmissionController, IdentityResolver, LimitRegistry, ManualClock};
use tokenguard_types::GatewayConfig;

use crate::state::AppState;

pub const START_MS: i64 = 1_700_000_000_000;

/// `AppState` over a memory store and a manual clock.
pub fn test_app_state() -> (AppState, ManualClock) {
    test_app_state_with(GatewayConfig::default(), CredentialMap::default())
}

pub fn test_app_state_with(config: GatewayConfig, credentials: CredentialMap) -> (AppState, ManualClock) {
    let clock = ManualClock::new(START_MS);
    let store = Arc::new(MemoryUsageStore::new(Arc::new(clock.clone())));
    let controller = Arc::new(AdmissionController::new(
        store,
        LimitRegistry::new(config.limits.default.clone()),
        Arc::new(clock.clone()),
    ));
    let resolver = Arc::new(IdentityResolver::new(&config.identity, credentials));

    let (state, _worker) =
        AppState::new(config, controller, resolver).expect("failed to create test AppState");
    (state, clock)
}
