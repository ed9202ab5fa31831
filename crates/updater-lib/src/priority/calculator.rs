//! Update priority calculation
//!
//! A calculator session collects the instances of one workload, scores each
//! against the workload's recommendation and hands back the instances that
//! need an update, most urgent first.

use crate::models::{Instance, Recommendation, ResourcesPolicy, UpdateConfig};
use tracing::{debug, trace};

/// An instance and its accumulated urgency score
#[derive(Debug, Clone, Copy)]
pub struct PriorityRecord<'a> {
    pub instance: &'a Instance,
    pub score: f64,
}

/// Ranks the instances of a single workload by how far their requests are
/// from the (policy-clamped) recommendation.
pub struct UpdatePriorityCalculator<'a> {
    policy: Option<&'a ResourcesPolicy>,
    config: UpdateConfig,
    records: Vec<PriorityRecord<'a>>,
}

impl<'a> UpdatePriorityCalculator<'a> {
    /// Create a session. A missing config behaves like a zero threshold.
    pub fn new(policy: Option<&'a ResourcesPolicy>, config: Option<UpdateConfig>) -> Self {
        Self {
            policy,
            config: config.unwrap_or_default(),
            records: Vec::new(),
        }
    }

    /// Score an instance and keep it if the change exceeds the threshold
    pub fn add_instance(&mut self, instance: &'a Instance, recommendation: &Recommendation) {
        let score = urgency(instance, recommendation, self.policy);

        if score > self.config.min_change_threshold {
            trace!(instance = %instance.id(), score, "Instance needs update");
            self.records.push(PriorityRecord { instance, score });
        } else {
            debug!(
                instance = %instance.id(),
                score,
                threshold = self.config.min_change_threshold,
                "Change below threshold, skipping instance"
            );
        }
    }

    /// Candidates ordered by descending score, ties in insertion order
    pub fn sorted_records(&self) -> Vec<PriorityRecord<'a>> {
        let mut records = self.records.clone();
        // `sort_by` is stable, which keeps equal scores in insertion order.
        records.sort_by(|a, b| b.score.total_cmp(&a.score));
        records
    }

    pub fn sorted_instances(&self) -> Vec<&'a Instance> {
        self.sorted_records()
            .into_iter()
            .map(|record| record.instance)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Summed relative difference between current requests and the clamped
/// recommendation, over every container and resource both sides define.
///
/// Containers without a recommendation entry contribute nothing. A zero
/// request facing a nonzero recommendation is infinitely urgent.
pub fn urgency(
    instance: &Instance,
    recommendation: &Recommendation,
    policy: Option<&ResourcesPolicy>,
) -> f64 {
    let mut score = 0.0;

    for container in &instance.containers {
        let Some(recommended) = recommendation.for_container(&container.name) else {
            continue;
        };

        for (resource, current) in &container.requests {
            let Some(target) = recommended.resources.get(resource) else {
                continue;
            };

            let target = match policy.and_then(|p| p.bounds(&container.name, *resource)) {
                Some(bounds) => bounds.clamp(*target),
                None => *target,
            };

            score += relative_diff(current.as_f64(), target.as_f64());
        }
    }

    score
}

fn relative_diff(current: f64, target: f64) -> f64 {
    if current == 0.0 {
        return if target == 0.0 { 0.0 } else { f64::INFINITY };
    }
    (target / current - 1.0).abs()
}
