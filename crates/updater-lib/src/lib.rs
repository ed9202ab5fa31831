//! Decision core of the vertical pod autoscaler updater
//!
//! This crate provides:
//! - Update priority ranking of instances against their recommendation
//! - Per-workload eviction budgets
//! - A TTL cache in front of the recommender
//! - The control loop that ties them together
//! - Health checks and observability

pub mod error;
pub mod eviction;
pub mod health;
pub mod listers;
pub mod models;
pub mod observability;
pub mod priority;
pub mod recommendation;
pub mod resource;
pub mod updater;

#[cfg(test)]
mod test_support;

pub use error::ValidationError;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{StructuredLogger, UpdaterMetrics};
pub use resource::{Quantity, ResourceName};
