//! Per-tick disruption budget

use crate::error::ValidationError;
use crate::models::Workload;
use tracing::warn;

/// Replica floor below which nothing is evicted
pub const DEFAULT_MIN_REPLICAS: u32 = 2;

/// Fraction of a workload's replicas that may be evicted in one pass
pub const DEFAULT_EVICTION_TOLERANCE: f64 = 0.5;

/// Computes how many instances of a workload may be evicted in one pass.
///
/// Two ceilings apply at once: a fraction of the fleet, and the distance to
/// the replica floor. The smaller one wins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionLimiter {
    min_replicas: u32,
    tolerance: f64,
}

impl Default for EvictionLimiter {
    fn default() -> Self {
        Self {
            min_replicas: DEFAULT_MIN_REPLICAS,
            tolerance: DEFAULT_EVICTION_TOLERANCE,
        }
    }
}

impl EvictionLimiter {
    /// Create a limiter with process-wide defaults. Workload policies may
    /// override either value.
    pub fn new(min_replicas: u32, tolerance: f64) -> Result<Self, ValidationError> {
        if !(0.0..=1.0).contains(&tolerance) {
            return Err(ValidationError::InvalidTolerance(tolerance));
        }
        Ok(Self {
            min_replicas,
            tolerance,
        })
    }

    pub fn min_replicas(&self) -> u32 {
        self.min_replicas
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Maximum number of evictions allowed for `workload` in this pass
    pub fn max_evictions(&self, workload: &Workload) -> u32 {
        let min_replicas = workload.policy.min_replicas.unwrap_or(self.min_replicas);
        let tolerance = match workload.policy.eviction_tolerance {
            Some(t) if (0.0..=1.0).contains(&t) => t,
            Some(t) => {
                let clamped = if t > 1.0 { 1.0 } else { 0.0 };
                warn!(
                    workload = %workload.id,
                    tolerance = t,
                    clamped,
                    "Eviction tolerance out of range, clamping"
                );
                clamped
            }
            None => self.tolerance,
        };

        allowed_evictions(workload.replicas, min_replicas, tolerance)
    }
}

fn allowed_evictions(replicas: u32, min_replicas: u32, tolerance: f64) -> u32 {
    // tolerance is within [0, 1], so the product never exceeds `replicas`.
    let budget = (f64::from(replicas) * tolerance).floor() as u32;
    budget.min(replicas.saturating_sub(min_replicas))
}
