//! # TokenGuard Core
//!
//! Admission control in front of a text-generation backend.
//!
//! ```text
//! tokenguard-core/src/
//! ├── estimator/   # character-class token estimate
//! ├── store/       # UsageStore trait, memory + SQLite backends
//! ├── limiter/     # gates, cooldowns, limit profiles, status
//! ├── identity/    # credential snapshot and caller resolution
//! ├── gateway/     # identify → estimate → admit → forward → reconcile
//! ├── server.rs    # axum router for the gateway routes
//! └── metrics.rs   # Prometheus recorder
//! ```

#![cfg_attr(
    test,
    allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)
)]

pub mod clock;
pub mod error;
pub mod estimator;
pub mod gateway;
pub mod identity;
pub mod limiter;
pub mod metrics;
pub mod server;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AppError, AppResult};
pub use estimator::TokenEstimator;
pub use gateway::GatewayState;
pub use identity::IdentityResolver;
pub use limiter::{Admission, AdmissionController, LimitRegistry};
pub use server::build_gateway_router;
pub use store::{open_store, UsageStore, UsageTicket};
