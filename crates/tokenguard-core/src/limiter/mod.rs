//! Admission controller.
//!
//! Five sequential gates, first failure wins:
//! 1. active cooldown (no counters touched)
//! 2. requests per minute
//! 3. tokens per minute
//! 4. tokens per hour
//! 5. tokens per rolling day (cooldown doubled)
//!
//! Gates 2-5 put the identity into cooldown when they fail. Store errors
//! fail open by default.

mod controller;
mod gates;
mod profiles;
mod status;

#[cfg(test)]
mod tests;

pub use controller::{Admission, AdmissionController};
pub use gates::{evaluate, Denial, Gate};
pub use profiles::{LimitRegistry, LimitTable};
pub use status::build_status;
