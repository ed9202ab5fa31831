//! The updater control loop
//!
//! One pass ([`Updater::run_once`]) walks every autoscaled workload, ranks
//! its instances by how stale their resource requests are and evicts the
//! most urgent ones, never more than the workload's disruption budget.
//! Every pass re-derives its view from the listers; apart from the
//! recommendation cache nothing carries over between passes.

mod r#loop;

#[cfg(test)]
mod tests;

pub use r#loop::{UpdaterBuilder, UpdaterLoop, DEFAULT_UPDATER_INTERVAL};

use crate::eviction::{EvictionController, EvictionLimiter};
use crate::listers::{InstanceLister, WorkloadLister};
use crate::models::{UpdateMode, Workload, WorkloadId};
use crate::observability::{StructuredLogger, UpdaterMetrics};
use crate::priority::UpdatePriorityCalculator;
use crate::recommendation::RecommendationCache;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Eviction activity for one workload in one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionStats {
    /// Instances ranked as needing an update
    pub candidates: usize,
    /// Disruption budget for this pass
    pub budget: u32,
    pub evicted: u32,
    /// Candidates the eviction controller refused
    pub vetoed: u32,
    /// Eviction attempts that returned an error
    pub failed: u32,
}

/// What happened to a workload in one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadOutcome {
    Processed(EvictionStats),
    /// Update mode is off
    Skipped,
    /// The workload's policy failed validation
    InvalidPolicy(String),
    InstancesUnavailable(String),
    RecommendationUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadReport {
    pub workload: WorkloadId,
    pub outcome: WorkloadOutcome,
}

/// Totals for one pass over all workloads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub workloads: usize,
    pub processed: usize,
    pub skipped: usize,
    pub invalid: usize,
    pub instance_fetch_failures: usize,
    pub recommendation_fetch_failures: usize,
    pub candidates: usize,
    pub evicted: usize,
    pub vetoed: usize,
    pub eviction_failures: usize,
    pub reports: Vec<WorkloadReport>,
}

impl TickSummary {
    fn record(&mut self, workload: &WorkloadId, outcome: WorkloadOutcome) {
        match &outcome {
            WorkloadOutcome::Processed(stats) => {
                self.processed += 1;
                self.candidates += stats.candidates;
                self.evicted += stats.evicted as usize;
                self.vetoed += stats.vetoed as usize;
                self.eviction_failures += stats.failed as usize;
            }
            WorkloadOutcome::Skipped => self.skipped += 1,
            WorkloadOutcome::InvalidPolicy(_) => self.invalid += 1,
            WorkloadOutcome::InstancesUnavailable(_) => self.instance_fetch_failures += 1,
            WorkloadOutcome::RecommendationUnavailable(_) => {
                self.recommendation_fetch_failures += 1
            }
        }
        self.reports.push(WorkloadReport {
            workload: workload.clone(),
            outcome,
        });
    }

    /// Outcome recorded for `workload`, if it was seen this pass
    pub fn outcome(&self, workload: &WorkloadId) -> Option<&WorkloadOutcome> {
        self.reports
            .iter()
            .find(|r| &r.workload == workload)
            .map(|r| &r.outcome)
    }
}

/// Decides which instances to evict and asks the eviction controller to do it
pub struct Updater {
    workloads: Arc<dyn WorkloadLister>,
    instances: Arc<dyn InstanceLister>,
    recommendations: Arc<RecommendationCache>,
    evictions: Arc<dyn EvictionController>,
    limiter: EvictionLimiter,
    metrics: UpdaterMetrics,
    logger: StructuredLogger,
}

impl Updater {
    pub fn new(
        workloads: Arc<dyn WorkloadLister>,
        instances: Arc<dyn InstanceLister>,
        recommendations: Arc<RecommendationCache>,
        evictions: Arc<dyn EvictionController>,
        limiter: EvictionLimiter,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            workloads,
            instances,
            recommendations,
            evictions,
            limiter,
            metrics: UpdaterMetrics::new(),
            logger,
        }
    }

    pub fn limiter(&self) -> &EvictionLimiter {
        &self.limiter
    }

    /// Run one pass over all workloads.
    ///
    /// Fails only when the workload list itself cannot be read; per-workload
    /// and per-instance failures are recorded in the summary instead.
    pub async fn run_once(&self) -> Result<TickSummary> {
        let start = Instant::now();

        let workloads = self
            .workloads
            .list()
            .await
            .context("Failed to list autoscaled workloads")?;
        self.metrics.set_workloads_managed(workloads.len() as i64);

        let mut summary = TickSummary {
            workloads: workloads.len(),
            ..Default::default()
        };

        for workload in &workloads {
            let outcome = self.process_workload(workload).await;
            summary.record(&workload.id, outcome);
        }

        let elapsed = start.elapsed();
        self.metrics.observe_tick_latency(elapsed.as_secs_f64());

        info!(
            workloads = summary.workloads,
            processed = summary.processed,
            candidates = summary.candidates,
            evicted = summary.evicted,
            eviction_failures = summary.eviction_failures,
            elapsed_ms = elapsed.as_millis(),
            "Updater pass complete"
        );

        Ok(summary)
    }

    async fn process_workload(&self, workload: &Workload) -> WorkloadOutcome {
        let workload_id = workload.id.to_string();

        if workload.policy.update_mode == UpdateMode::Off {
            debug!(workload = %workload_id, "Update mode is off, skipping workload");
            self.metrics.inc_workloads_skipped();
            return WorkloadOutcome::Skipped;
        }

        if let Err(e) = workload.validate() {
            error!(workload = %workload_id, error = %e, "Invalid autoscaling policy");
            self.metrics.inc_workloads_failed();
            return WorkloadOutcome::InvalidPolicy(e.to_string());
        }

        let instances = match self
            .instances
            .list(&workload.id.namespace, &workload.selector)
            .await
        {
            Ok(instances) => instances,
            Err(e) => {
                let reason = format!("failed to list instances: {e:#}");
                self.logger.log_workload_skipped(&workload_id, &reason);
                self.metrics.inc_workloads_failed();
                return WorkloadOutcome::InstancesUnavailable(reason);
            }
        };

        let recommendation = match self.recommendations.get(&workload.id).await {
            Ok(recommendation) => recommendation,
            Err(e) => {
                let reason = format!("failed to get recommendation: {e:#}");
                self.logger.log_workload_skipped(&workload_id, &reason);
                self.metrics.inc_workloads_failed();
                return WorkloadOutcome::RecommendationUnavailable(reason);
            }
        };

        let mut calculator = UpdatePriorityCalculator::new(
            workload.policy.resources_policy.as_ref(),
            workload.policy.update_config,
        );
        let mut seen = HashSet::new();
        for instance in &instances {
            if !seen.insert(instance.id()) {
                warn!(workload = %workload_id, instance = %instance.id(), "Duplicate instance in listing, ignoring");
                continue;
            }
            calculator.add_instance(instance, &recommendation);
        }

        let ranked = calculator.sorted_records();
        let budget = self.limiter.max_evictions(workload);
        self.metrics.add_update_candidates(ranked.len() as u64);

        debug!(
            workload = %workload_id,
            instances = instances.len(),
            candidates = ranked.len(),
            budget,
            "Ranked instances for update"
        );

        let mut stats = EvictionStats {
            candidates: ranked.len(),
            budget,
            ..Default::default()
        };

        for record in ranked {
            if stats.evicted >= budget {
                break;
            }

            let instance = record.instance;
            if !self.evictions.can_evict(instance).await {
                debug!(workload = %workload_id, instance = %instance.id(), "Eviction vetoed");
                stats.vetoed += 1;
                self.metrics.inc_evictions_vetoed();
                continue;
            }

            match self.evictions.evict(instance).await {
                Ok(()) => {
                    stats.evicted += 1;
                    self.metrics.inc_evictions();
                    self.logger
                        .log_eviction(&workload_id, &instance.id(), record.score, budget);
                }
                Err(e) => {
                    // Does not consume budget; the next candidate gets a chance.
                    stats.failed += 1;
                    self.metrics.inc_eviction_failures();
                    self.logger
                        .log_eviction_failure(&workload_id, &instance.id(), &format!("{e:#}"));
                }
            }
        }

        WorkloadOutcome::Processed(stats)
    }
}
