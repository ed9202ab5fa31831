//! Read-side collaborators: autoscaled workloads and their instances

use crate::models::{Instance, LabelSelector, Workload};
use anyhow::Result;
use async_trait::async_trait;

/// Lists the workloads under vertical autoscaling, with their policies
#[async_trait]
pub trait WorkloadLister: Send + Sync {
    async fn list(&self) -> Result<Vec<Workload>>;
}

/// Lists the running instances matching a selector
#[async_trait]
pub trait InstanceLister: Send + Sync {
    async fn list(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<Instance>>;
}
