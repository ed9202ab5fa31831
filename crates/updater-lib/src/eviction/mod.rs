//! Eviction budget and the eviction collaborator
//!
//! The updater never removes instances itself. It asks an
//! [`EvictionController`] whether an instance may go and then asks it to
//! evict, staying within the budget computed by [`EvictionLimiter`].

mod limiter;

pub use limiter::{EvictionLimiter, DEFAULT_EVICTION_TOLERANCE, DEFAULT_MIN_REPLICAS};

use crate::models::Instance;
use anyhow::Result;
use async_trait::async_trait;

/// Removes instances so the scheduler recreates them with fresh requests
#[async_trait]
pub trait EvictionController: Send + Sync {
    /// Side-effect free eligibility check (disruption budgets, admission vetoes)
    async fn can_evict(&self, instance: &Instance) -> bool;

    /// Evict the instance
    async fn evict(&self, instance: &Instance) -> Result<()>;
}
