//! Request gateway.
//!
//! Every metered request runs the same ordered stages:
//! identify → estimate → admit → forward → reconcile.
//! A stage either hands its output to the next one or short-circuits with a
//! [`Rejection`]; nothing runs after a rejection.

mod pipeline;
mod reconcile;
mod response;
mod upstream;
mod usage;

pub use pipeline::{metered_handler, passthrough_handler};
pub use reconcile::{ReconcileJob, ReconcileQueue};
pub use response::{Rejection, ResponseTags};
pub use upstream::{build_http_client, strip_hop_headers, UpstreamClient};
pub use usage::{extract_usage_from_json, usage_from_body, usage_from_sse_tail, ActualUsage};

use std::sync::Arc;

use crate::estimator::TokenEstimator;
use crate::identity::IdentityResolver;
use crate::limiter::AdmissionController;

/// Shared state of the gateway routes.
#[derive(Clone)]
pub struct GatewayState {
    pub controller: Arc<AdmissionController>,
    pub resolver: Arc<IdentityResolver>,
    pub estimator: TokenEstimator,
    pub upstream: Arc<UpstreamClient>,
    pub reconciler: ReconcileQueue,
    pub body_limit: usize,
}
