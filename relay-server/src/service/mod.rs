//! Service layer
//!
//! Business logic of the relay: resolving which workloads a notification
//! targets and rolling the new image out to them.

pub mod retry;
pub mod rollout;

pub use retry::RetryPolicy;
pub use rollout::{Outcome, RolloutError, RolloutReport, RolloutService, WorkloadError};
