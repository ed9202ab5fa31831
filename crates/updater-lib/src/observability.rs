//! Observability infrastructure for the updater
//!
//! Provides:
//! - Prometheus metrics (tick latency, evictions, skipped workloads, cache efficiency)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for a full updater pass (in seconds)
const TICK_LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<UpdaterMetricsInner> = OnceLock::new();

struct UpdaterMetricsInner {
    tick_latency_seconds: Histogram,
    workloads_managed: IntGauge,
    workloads_skipped: IntCounter,
    workloads_failed: IntCounter,
    update_candidates: IntCounter,
    evictions: IntCounter,
    eviction_failures: IntCounter,
    evictions_vetoed: IntCounter,
    cache_hits: IntCounter,
    cache_misses: IntCounter,
}

impl UpdaterMetricsInner {
    fn new() -> Self {
        Self {
            tick_latency_seconds: register_histogram!(
                "vpa_updater_tick_latency_seconds",
                "Time spent in one pass over all workloads",
                TICK_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_latency_seconds"),

            workloads_managed: register_int_gauge!(
                "vpa_updater_workloads_managed",
                "Number of workloads seen in the last pass"
            )
            .expect("Failed to register workloads_managed"),

            workloads_skipped: register_int_counter!(
                "vpa_updater_workloads_skipped_total",
                "Workloads skipped because their update mode is off"
            )
            .expect("Failed to register workloads_skipped"),

            workloads_failed: register_int_counter!(
                "vpa_updater_workloads_failed_total",
                "Workloads skipped because instances or recommendation could not be read"
            )
            .expect("Failed to register workloads_failed"),

            update_candidates: register_int_counter!(
                "vpa_updater_update_candidates_total",
                "Instances ranked as needing an update"
            )
            .expect("Failed to register update_candidates"),

            evictions: register_int_counter!(
                "vpa_updater_evictions_total",
                "Instances evicted for update"
            )
            .expect("Failed to register evictions"),

            eviction_failures: register_int_counter!(
                "vpa_updater_eviction_failures_total",
                "Eviction attempts that returned an error"
            )
            .expect("Failed to register eviction_failures"),

            evictions_vetoed: register_int_counter!(
                "vpa_updater_evictions_vetoed_total",
                "Candidates the eviction controller refused to evict"
            )
            .expect("Failed to register evictions_vetoed"),

            cache_hits: register_int_counter!(
                "vpa_updater_recommendation_cache_hits_total",
                "Recommendation lookups served from cache"
            )
            .expect("Failed to register cache_hits"),

            cache_misses: register_int_counter!(
                "vpa_updater_recommendation_cache_misses_total",
                "Recommendation lookups that went to the recommender"
            )
            .expect("Failed to register cache_misses"),
        }
    }
}

/// Updater metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct UpdaterMetrics {
    _private: (),
}

impl Default for UpdaterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdaterMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(UpdaterMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &UpdaterMetricsInner {
        GLOBAL_METRICS.get_or_init(UpdaterMetricsInner::new)
    }

    pub fn observe_tick_latency(&self, duration_secs: f64) {
        self.inner().tick_latency_seconds.observe(duration_secs);
    }

    pub fn set_workloads_managed(&self, count: i64) {
        self.inner().workloads_managed.set(count);
    }

    pub fn inc_workloads_skipped(&self) {
        self.inner().workloads_skipped.inc();
    }

    pub fn inc_workloads_failed(&self) {
        self.inner().workloads_failed.inc();
    }

    pub fn add_update_candidates(&self, count: u64) {
        self.inner().update_candidates.inc_by(count);
    }

    pub fn inc_evictions(&self) {
        self.inner().evictions.inc();
    }

    pub fn inc_eviction_failures(&self) {
        self.inner().eviction_failures.inc();
    }

    pub fn inc_evictions_vetoed(&self) {
        self.inner().evictions_vetoed.inc();
    }

    pub fn inc_cache_hits(&self) {
        self.inner().cache_hits.inc();
    }

    pub fn inc_cache_misses(&self) {
        self.inner().cache_misses.inc();
    }
}

/// Structured logger for updater events
///
/// Provides consistent JSON-formatted logging for evictions, skipped
/// workloads and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    /// Log a successful eviction
    pub fn log_eviction(&self, workload: &str, instance: &str, score: f64, budget: u32) {
        info!(
            event = "instance_evicted",
            node = %self.node_name,
            workload = %workload,
            instance = %instance,
            priority = score,
            budget = budget,
            "Evicted instance for update"
        );
    }

    /// Log a failed eviction attempt
    pub fn log_eviction_failure(&self, workload: &str, instance: &str, error: &str) {
        warn!(
            event = "eviction_failed",
            node = %self.node_name,
            workload = %workload,
            instance = %instance,
            error = %error,
            "Eviction attempt failed"
        );
    }

    /// Log a workload that was not processed this pass
    pub fn log_workload_skipped(&self, workload: &str, reason: &str) {
        warn!(
            event = "workload_skipped",
            node = %self.node_name,
            workload = %workload,
            reason = %reason,
            "Skipping workload for this pass"
        );
    }

    /// Log updater startup
    pub fn log_startup(&self, version: &str, interval_secs: u64) {
        info!(
            event = "updater_started",
            node = %self.node_name,
            updater_version = %version,
            interval_secs = interval_secs,
            "VPA updater started"
        );
    }

    /// Log updater shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "updater_shutdown",
            node = %self.node_name,
            reason = %reason,
            "VPA updater shutting down"
        );
    }
}
