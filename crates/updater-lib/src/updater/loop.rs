//! Timer-driven updater loop
//!
//! Runs [`Updater::run_once`] on a fixed interval. A pass always finishes
//! before the next tick is taken, so two passes never count eviction
//! budgets against the same live instances.

use super::{TickSummary, Updater};
use crate::eviction::{EvictionController, EvictionLimiter};
use crate::health::{components, HealthRegistry};
use crate::listers::{InstanceLister, WorkloadLister};
use crate::observability::StructuredLogger;
use crate::recommendation::{
    Clock, RecommendationCache, RecommenderSource, SystemClock, DEFAULT_CACHE_TTL,
};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Default time between passes
pub const DEFAULT_UPDATER_INTERVAL: Duration = Duration::from_secs(60);

pub struct UpdaterLoop {
    updater: Updater,
    interval: Duration,
    health: Option<HealthRegistry>,
}

impl UpdaterLoop {
    pub fn new(updater: Updater, interval: Duration) -> Self {
        Self {
            updater,
            interval,
            health: None,
        }
    }

    /// Report pass results to a health registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Run until a shutdown signal arrives. The first pass starts one
    /// interval after the call.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting updater loop"
        );

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down updater loop");
                    break;
                }
            }
        }
    }

    /// Run a single pass and update health accordingly
    pub async fn tick(&self) -> Option<TickSummary> {
        match self.updater.run_once().await {
            Ok(summary) => {
                self.report(&summary).await;
                Some(summary)
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Updater pass aborted");
                if let Some(health) = &self.health {
                    health
                        .set_degraded(components::RECOMMENDER, "failed to list workloads")
                        .await;
                }
                None
            }
        }
    }

    async fn report(&self, summary: &TickSummary) {
        let Some(health) = &self.health else {
            return;
        };

        health.record_tick().await;
        health.set_healthy(components::UPDATER).await;

        if summary.recommendation_fetch_failures > 0 {
            health
                .set_degraded(
                    components::RECOMMENDER,
                    format!(
                        "recommendation unavailable for {} workload(s)",
                        summary.recommendation_fetch_failures
                    ),
                )
                .await;
        } else {
            health.set_healthy(components::RECOMMENDER).await;
        }

        if summary.instance_fetch_failures > 0 || summary.eviction_failures > 0 {
            health
                .set_degraded(
                    components::CLUSTER,
                    format!(
                        "{} listing failure(s), {} eviction failure(s)",
                        summary.instance_fetch_failures, summary.eviction_failures
                    ),
                )
                .await;
        } else {
            health.set_healthy(components::CLUSTER).await;
        }
    }
}

/// Assembles an [`Updater`] from its collaborators
pub struct UpdaterBuilder {
    workloads: Option<Arc<dyn WorkloadLister>>,
    instances: Option<Arc<dyn InstanceLister>>,
    recommender: Option<Arc<dyn RecommenderSource>>,
    evictions: Option<Arc<dyn EvictionController>>,
    clock: Arc<dyn Clock>,
    cache_ttl: Duration,
    limiter: EvictionLimiter,
    logger: StructuredLogger,
}

impl UpdaterBuilder {
    pub fn new() -> Self {
        Self {
            workloads: None,
            instances: None,
            recommender: None,
            evictions: None,
            clock: Arc::new(SystemClock),
            cache_ttl: DEFAULT_CACHE_TTL,
            limiter: EvictionLimiter::default(),
            logger: StructuredLogger::new("vpa-updater"),
        }
    }

    pub fn workload_lister(mut self, lister: Arc<dyn WorkloadLister>) -> Self {
        self.workloads = Some(lister);
        self
    }

    pub fn instance_lister(mut self, lister: Arc<dyn InstanceLister>) -> Self {
        self.instances = Some(lister);
        self
    }

    pub fn recommender(mut self, recommender: Arc<dyn RecommenderSource>) -> Self {
        self.recommender = Some(recommender);
        self
    }

    pub fn eviction_controller(mut self, controller: Arc<dyn EvictionController>) -> Self {
        self.evictions = Some(controller);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn limiter(mut self, limiter: EvictionLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> Result<Updater> {
        let workloads = self
            .workloads
            .ok_or_else(|| anyhow::anyhow!("Workload lister is required"))?;
        let instances = self
            .instances
            .ok_or_else(|| anyhow::anyhow!("Instance lister is required"))?;
        let recommender = self
            .recommender
            .ok_or_else(|| anyhow::anyhow!("Recommender is required"))?;
        let evictions = self
            .evictions
            .ok_or_else(|| anyhow::anyhow!("Eviction controller is required"))?;

        let cache = Arc::new(RecommendationCache::new(
            recommender,
            self.clock,
            self.cache_ttl,
        ));

        Ok(Updater::new(
            workloads,
            instances,
            cache,
            evictions,
            self.limiter,
            self.logger,
        ))
    }
}

impl Default for UpdaterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
