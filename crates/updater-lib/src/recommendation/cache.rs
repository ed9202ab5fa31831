//! TTL cache in front of the recommender
//!
//! Entries are checked for staleness lazily on access; there is no
//! background sweep. A failed fetch is returned to the caller as-is and a
//! stale entry is never served in its place.

use super::{Clock, RecommenderSource};
use crate::models::{Recommendation, WorkloadId};
use crate::observability::UpdaterMetrics;
use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Default time-to-live for cached recommendations
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(2 * 60);

#[derive(Debug, Clone)]
struct CachedRecommendation {
    recommendation: Arc<Recommendation>,
    fetched_at: Instant,
}

/// Per-workload recommendation cache with a fixed TTL
pub struct RecommendationCache {
    source: Arc<dyn RecommenderSource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: DashMap<WorkloadId, CachedRecommendation>,
    metrics: UpdaterMetrics,
}

impl RecommendationCache {
    pub fn new(source: Arc<dyn RecommenderSource>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            source,
            clock,
            ttl,
            entries: DashMap::new(),
            metrics: UpdaterMetrics::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the recommendation for `workload`, fetching it when the cached
    /// entry is missing or older than the TTL.
    pub async fn get(&self, workload: &WorkloadId) -> Result<Arc<Recommendation>> {
        if let Some(entry) = self.entries.get(workload) {
            let age = self.clock.now().saturating_duration_since(entry.fetched_at);
            if age < self.ttl {
                trace!(workload = %workload, age_ms = age.as_millis(), "Recommendation cache hit");
                self.metrics.inc_cache_hits();
                return Ok(entry.recommendation.clone());
            }
        }

        self.metrics.inc_cache_misses();
        let recommendation = match self.source.get_recommendation(workload).await {
            Ok(r) => Arc::new(r),
            Err(e) => {
                if self.entries.remove(workload).is_some() {
                    debug!(workload = %workload, "Dropped stale recommendation after failed fetch");
                }
                return Err(e);
            }
        };

        self.entries.insert(
            workload.clone(),
            CachedRecommendation {
                recommendation: recommendation.clone(),
                fetched_at: self.clock.now(),
            },
        );
        debug!(workload = %workload, "Fetched recommendation");

        Ok(recommendation)
    }

    /// Forget the cached entry for `workload`
    pub fn invalidate(&self, workload: &WorkloadId) {
        self.entries.remove(workload);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
