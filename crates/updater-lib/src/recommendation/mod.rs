//! Recommendation access
//!
//! Recommendations come from an external recommender. The updater reads them
//! through a TTL cache so each tick does not cost a round trip per workload.

mod cache;
mod clock;

pub use cache::{RecommendationCache, DEFAULT_CACHE_TTL};
pub use clock::{Clock, ManualClock, SystemClock};

use crate::models::{Recommendation, WorkloadId};
use anyhow::Result;
use async_trait::async_trait;

/// Source of recommendations for a workload
#[async_trait]
pub trait RecommenderSource: Send + Sync {
    /// Fetch the current recommendation. Fails on not-found or transport errors.
    async fn get_recommendation(&self, workload: &WorkloadId) -> Result<Recommendation>;
}
