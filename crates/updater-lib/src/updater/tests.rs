//! Control loop tests
//!
//! These tests verify:
//! - Eviction order and disruption budget
//! - Vetoed and failed evictions
//! - Per-workload isolation of fetch failures
//! - Loop wiring: health reporting and shutdown

use super::*;
use crate::health::{components, ComponentStatus, HealthRegistry};
use crate::models::{Instance, LabelSelector, Recommendation, UpdateConfig};
use crate::recommendation::{ManualClock, RecommenderSource};
use crate::test_support::{instance, recommendation, workload, CONTAINER_NAME};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

struct MockWorkloads {
    workloads: Vec<Workload>,
    failing: AtomicBool,
}

#[async_trait]
impl WorkloadLister for MockWorkloads {
    async fn list(&self) -> Result<Vec<Workload>> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("workload API unavailable");
        }
        Ok(self.workloads.clone())
    }
}

/// Instances keyed by the rendered selector
#[derive(Default)]
struct MockInstances {
    instances: HashMap<String, Vec<Instance>>,
    failing: HashSet<String>,
    calls: AtomicUsize,
}

#[async_trait]
impl InstanceLister for MockInstances {
    async fn list(&self, _namespace: &str, selector: &LabelSelector) -> Result<Vec<Instance>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = selector.to_string();
        if self.failing.contains(&key) {
            anyhow::bail!("list failed for {}", key);
        }
        Ok(self.instances.get(&key).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct MockRecommender {
    recommendations: HashMap<WorkloadId, Recommendation>,
    calls: AtomicUsize,
}

#[async_trait]
impl RecommenderSource for MockRecommender {
    async fn get_recommendation(&self, workload: &WorkloadId) -> Result<Recommendation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.recommendations
            .get(workload)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no recommendation for {}", workload))
    }
}

#[derive(Default)]
struct MockEvictions {
    vetoed: HashSet<String>,
    failing: HashSet<String>,
    attempts: Mutex<Vec<String>>,
    evicted: Mutex<Vec<String>>,
}

impl MockEvictions {
    fn evicted(&self) -> Vec<String> {
        self.evicted.lock().unwrap().clone()
    }

    fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl EvictionController for MockEvictions {
    async fn can_evict(&self, instance: &Instance) -> bool {
        !self.vetoed.contains(&instance.name)
    }

    async fn evict(&self, instance: &Instance) -> Result<()> {
        self.attempts.lock().unwrap().push(instance.name.clone());
        if self.failing.contains(&instance.name) {
            anyhow::bail!("eviction of {} rejected", instance.name);
        }
        self.evicted.lock().unwrap().push(instance.name.clone());
        Ok(())
    }
}

/// Four instances whose cpu requests are {2, 4, 1, 3}, recommended 10 each.
/// Priority order is POD3, POD1, POD4, POD2.
fn ranked_pods() -> Vec<Instance> {
    vec![
        instance("POD1", CONTAINER_NAME, "2", ""),
        instance("POD2", CONTAINER_NAME, "4", ""),
        instance("POD3", CONTAINER_NAME, "1", ""),
        instance("POD4", CONTAINER_NAME, "3", ""),
    ]
}

struct Fixture {
    workloads: Vec<Workload>,
    instances: MockInstances,
    recommender: MockRecommender,
    evictions: MockEvictions,
}

impl Fixture {
    /// One workload "web" with the four ranked pods and 4 replicas
    fn single() -> Self {
        let mut fixture = Self::empty();
        fixture.add_workload(workload("web", 4), ranked_pods(), Some(recommendation(CONTAINER_NAME, "10", "")));
        fixture
    }

    fn empty() -> Self {
        Self {
            workloads: Vec::new(),
            instances: MockInstances::default(),
            recommender: MockRecommender::default(),
            evictions: MockEvictions::default(),
        }
    }

    fn add_workload(&mut self, w: Workload, pods: Vec<Instance>, rec: Option<Recommendation>) {
        self.instances.instances.insert(w.selector.to_string(), pods);
        if let Some(rec) = rec {
            self.recommender.recommendations.insert(w.id.clone(), rec);
        }
        self.workloads.push(w);
    }

    fn build(self) -> Harness {
        let workloads = Arc::new(MockWorkloads {
            workloads: self.workloads,
            failing: AtomicBool::new(false),
        });
        let instances = Arc::new(self.instances);
        let recommender = Arc::new(self.recommender);
        let evictions = Arc::new(self.evictions);

        let updater = UpdaterBuilder::new()
            .workload_lister(workloads.clone())
            .instance_lister(instances.clone())
            .recommender(recommender.clone())
            .eviction_controller(evictions.clone())
            .clock(Arc::new(ManualClock::new()))
            .limiter(EvictionLimiter::new(2, 0.5).unwrap())
            .build()
            .unwrap();

        Harness {
            updater,
            workloads,
            instances,
            recommender,
            evictions,
        }
    }
}

struct Harness {
    updater: Updater,
    workloads: Arc<MockWorkloads>,
    instances: Arc<MockInstances>,
    recommender: Arc<MockRecommender>,
    evictions: Arc<MockEvictions>,
}

fn stats(summary: &TickSummary, name: &str) -> EvictionStats {
    match summary.outcome(&WorkloadId::new("default", name)) {
        Some(WorkloadOutcome::Processed(stats)) => stats.clone(),
        other => panic!("workload {name} not processed: {other:?}"),
    }
}

mod eviction_budget_tests {
    use super::*;

    #[tokio::test]
    async fn test_evicts_most_urgent_up_to_budget() {
        let h = Fixture::single().build();

        let summary = h.updater.run_once().await.unwrap();

        // 4 replicas, tolerance 0.5, floor 2 => budget 2
        assert_eq!(h.evictions.evicted(), vec!["POD3", "POD1"]);
        let stats = stats(&summary, "web");
        assert_eq!(stats.budget, 2);
        assert_eq!(stats.candidates, 4);
        assert_eq!(stats.evicted, 2);
        assert_eq!(summary.evicted, 2);
    }

    #[tokio::test]
    async fn test_vetoed_instance_is_skipped() {
        let mut fixture = Fixture::single();
        fixture.evictions.vetoed.insert("POD3".to_string());
        let h = fixture.build();

        let summary = h.updater.run_once().await.unwrap();

        assert_eq!(h.evictions.evicted(), vec!["POD1", "POD4"]);
        assert_eq!(stats(&summary, "web").vetoed, 1);
        assert!(!h.evictions.attempts().contains(&"POD3".to_string()));
    }

    #[tokio::test]
    async fn test_failed_eviction_does_not_consume_budget() {
        let mut fixture = Fixture::single();
        fixture.evictions.failing.insert("POD3".to_string());
        let h = fixture.build();

        let summary = h.updater.run_once().await.unwrap();

        assert_eq!(h.evictions.attempts(), vec!["POD3", "POD1", "POD4"]);
        assert_eq!(h.evictions.evicted(), vec!["POD1", "POD4"]);
        assert_eq!(summary.eviction_failures, 1);
        assert_eq!(summary.evicted, 2);
    }

    #[tokio::test]
    async fn test_candidates_exhausted_before_budget() {
        let mut fixture = Fixture::empty();
        let pods = vec![
            instance("POD1", CONTAINER_NAME, "10", ""),
            instance("POD2", CONTAINER_NAME, "5", ""),
        ];
        fixture.add_workload(workload("web", 10), pods, Some(recommendation(CONTAINER_NAME, "10", "")));
        let h = fixture.build();

        let summary = h.updater.run_once().await.unwrap();

        assert_eq!(h.evictions.evicted(), vec!["POD2"]);
        let stats = stats(&summary, "web");
        assert_eq!(stats.budget, 5);
        assert_eq!(stats.candidates, 1);
    }

    #[tokio::test]
    async fn test_no_eviction_at_replica_floor() {
        let mut fixture = Fixture::empty();
        fixture.add_workload(workload("web", 2), ranked_pods(), Some(recommendation(CONTAINER_NAME, "10", "")));
        let h = fixture.build();

        let summary = h.updater.run_once().await.unwrap();

        assert!(h.evictions.attempts().is_empty());
        assert_eq!(stats(&summary, "web").budget, 0);
    }

    #[tokio::test]
    async fn test_threshold_from_workload_policy() {
        let mut fixture = Fixture::empty();
        let mut w = workload("web", 10);
        w.policy.update_config = Some(UpdateConfig::new(0.5).unwrap());
        let pods = vec![
            instance("POD1", CONTAINER_NAME, "4", ""),
            instance("POD2", CONTAINER_NAME, "1", ""),
        ];
        fixture.add_workload(w, pods, Some(recommendation(CONTAINER_NAME, "5", "")));
        let h = fixture.build();

        h.updater.run_once().await.unwrap();

        assert_eq!(h.evictions.evicted(), vec!["POD2"]);
    }

    #[tokio::test]
    async fn test_duplicate_instance_evicted_once() {
        let mut fixture = Fixture::empty();
        let pod = instance("POD1", CONTAINER_NAME, "1", "");
        fixture.add_workload(
            workload("web", 10),
            vec![pod.clone(), pod],
            Some(recommendation(CONTAINER_NAME, "10", "")),
        );
        let h = fixture.build();

        h.updater.run_once().await.unwrap();

        assert_eq!(h.evictions.attempts(), vec!["POD1"]);
    }
}

mod workload_isolation_tests {
    use super::*;

    #[tokio::test]
    async fn test_instance_list_failure_skips_only_that_workload() {
        let mut fixture = Fixture::single();
        let broken = workload("broken", 10);
        fixture.instances.failing.insert(broken.selector.to_string());
        fixture.add_workload(broken, Vec::new(), Some(recommendation(CONTAINER_NAME, "10", "")));
        let h = fixture.build();

        let summary = h.updater.run_once().await.unwrap();

        assert!(matches!(
            summary.outcome(&WorkloadId::new("default", "broken")),
            Some(WorkloadOutcome::InstancesUnavailable(_))
        ));
        assert_eq!(summary.instance_fetch_failures, 1);
        assert_eq!(h.evictions.evicted(), vec!["POD3", "POD1"]);
    }

    #[tokio::test]
    async fn test_missing_recommendation_skips_workload() {
        let mut fixture = Fixture::empty();
        let pods = vec![instance("LONELY", CONTAINER_NAME, "1", "")];
        fixture.add_workload(workload("norec", 10), pods, None);
        fixture.add_workload(workload("web", 4), ranked_pods(), Some(recommendation(CONTAINER_NAME, "10", "")));
        let h = fixture.build();

        let summary = h.updater.run_once().await.unwrap();

        assert!(matches!(
            summary.outcome(&WorkloadId::new("default", "norec")),
            Some(WorkloadOutcome::RecommendationUnavailable(_))
        ));
        assert_eq!(summary.recommendation_fetch_failures, 1);
        assert_eq!(h.evictions.evicted(), vec!["POD3", "POD1"]);
    }

    #[tokio::test]
    async fn test_update_mode_off_is_untouched() {
        let mut fixture = Fixture::empty();
        let mut w = workload("web", 10);
        w.policy.update_mode = UpdateMode::Off;
        fixture.add_workload(w, ranked_pods(), Some(recommendation(CONTAINER_NAME, "10", "")));
        let h = fixture.build();

        let summary = h.updater.run_once().await.unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(h.instances.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.recommender.calls.load(Ordering::SeqCst), 0);
        assert!(h.evictions.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_policy_is_reported() {
        let mut fixture = Fixture::empty();
        let mut w = workload("web", 10);
        w.policy.update_config = Some(UpdateConfig {
            min_change_threshold: -1.0,
        });
        fixture.add_workload(w, ranked_pods(), Some(recommendation(CONTAINER_NAME, "10", "")));
        let h = fixture.build();

        let summary = h.updater.run_once().await.unwrap();

        assert_eq!(summary.invalid, 1);
        assert!(h.evictions.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_workload_list_failure_aborts_pass() {
        let h = Fixture::single().build();
        h.workloads.failing.store(true, Ordering::SeqCst);

        assert!(h.updater.run_once().await.is_err());
        assert!(h.evictions.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_recommendation_cached_across_passes() {
        let h = Fixture::single().build();

        h.updater.run_once().await.unwrap();
        h.updater.run_once().await.unwrap();

        assert_eq!(h.recommender.calls.load(Ordering::SeqCst), 1);
        // The instance set is re-read every pass.
        assert_eq!(h.instances.calls.load(Ordering::SeqCst), 2);
    }
}

mod loop_tests {
    use super::*;

    #[tokio::test]
    async fn test_builder_requires_collaborators() {
        let result = UpdaterBuilder::new()
            .instance_lister(Arc::new(MockInstances::default()))
            .recommender(Arc::new(MockRecommender::default()))
            .eviction_controller(Arc::new(MockEvictions::default()))
            .build();

        let err = result.err().expect("builder should fail");
        assert!(err.to_string().contains("Workload lister"));
    }

    #[tokio::test]
    async fn test_tick_reports_health() {
        let mut fixture = Fixture::single();
        fixture.evictions.failing.insert("POD3".to_string());
        let h = fixture.build();

        let health = HealthRegistry::new();
        let updater_loop = UpdaterLoop::new(h.updater, Duration::from_secs(60)).with_health(health.clone());

        let summary = updater_loop.tick().await.unwrap();
        assert_eq!(summary.eviction_failures, 1);

        let report = health.health().await;
        assert!(report.last_tick_timestamp.is_some());
        assert_eq!(report.components[components::UPDATER].status, ComponentStatus::Healthy);
        assert_eq!(report.components[components::CLUSTER].status, ComponentStatus::Degraded);
        assert_eq!(report.components[components::RECOMMENDER].status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_tick_failure_degrades_recommender() {
        let h = Fixture::single().build();
        h.workloads.failing.store(true, Ordering::SeqCst);

        let health = HealthRegistry::new();
        let updater_loop = UpdaterLoop::new(h.updater, Duration::from_secs(60)).with_health(health.clone());

        assert!(updater_loop.tick().await.is_none());
        let report = health.health().await;
        assert_eq!(report.components[components::RECOMMENDER].status, ComponentStatus::Degraded);
        assert!(report.last_tick_timestamp.is_none());
    }

    #[tokio::test]
    async fn test_loop_runs_and_stops_on_shutdown() {
        let h = Fixture::single().build();
        let evictions = h.evictions.clone();
        let updater_loop = UpdaterLoop::new(h.updater, Duration::from_millis(20));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(updater_loop.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop should stop")
            .unwrap();

        // Each pass evicts the two most urgent instances again, since the
        // mock never removes them from the listing.
        let evicted = evictions.evicted();
        assert!(evicted.len() >= 2);
        assert_eq!(&evicted[..2], &["POD3", "POD1"]);
    }
}
