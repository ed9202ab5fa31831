//! Construction-time validation errors
//!
//! These are caller defects: malformed quantities, inverted policy bounds or
//! out-of-range tuning knobs. They are surfaced immediately and never
//! recovered from inside the control loop.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid quantity '{0}'")]
    InvalidQuantity(String),

    #[error("quantity '{0}' must not be negative")]
    NegativeQuantity(String),

    #[error("unknown resource name '{0}'")]
    UnknownResource(String),

    #[error("policy for container '{container}' has {resource} min {min} above max {max}")]
    InvalidBounds {
        container: String,
        resource: String,
        min: String,
        max: String,
    },

    #[error("min change threshold must be a finite non-negative number, got {0}")]
    InvalidThreshold(f64),

    #[error("eviction tolerance must be within [0, 1], got {0}")]
    InvalidTolerance(f64),
}
