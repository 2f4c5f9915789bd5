//! Gateway configuration models.

mod enums;
mod sections;

pub use enums::StorageBackend;
pub use sections::{
    AdminConfig, EstimatorConfig, IdentityConfig, LimitsConfig, LoggingConfig, ReconcileConfig,
    ServerConfig, StorageConfig, UpstreamConfig,
};

use super::Pricing;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Full gateway configuration.
///
/// Every section defaults independently, so a config file only needs to list
/// the values it changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, Validate)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener settings
    #[validate(nested)]
    pub server: ServerConfig,
    /// Backend model server
    #[validate(nested)]
    pub upstream: UpstreamConfig,
    /// Usage store selection
    #[validate(nested)]
    pub storage: StorageConfig,
    /// Default limit profile and failure policy
    #[validate(nested)]
    pub limits: LimitsConfig,
    /// Token estimator tuning
    #[validate(nested)]
    pub estimator: EstimatorConfig,
    /// Caller identification
    #[validate(nested)]
    pub identity: IdentityConfig,
    /// Cost estimate price list
    pub pricing: Pricing,
    /// Background reconciliation queue
    #[validate(nested)]
    pub reconcile: ReconcileConfig,
    /// Operator API protection
    pub admin: AdminConfig,
    /// Log sink
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Get the full bind socket address.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
