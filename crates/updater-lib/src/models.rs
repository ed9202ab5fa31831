//! Core data models for the updater

use crate::error::ValidationError;
use crate::resource::{Quantity, ResourceName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of an autoscaled workload
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkloadId {
    pub namespace: String,
    pub name: String,
}

impl WorkloadId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A container and its current resource requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub requests: BTreeMap<ResourceName, Quantity>,
}

impl Container {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requests: BTreeMap::new(),
        }
    }

    pub fn with_request(mut self, resource: ResourceName, quantity: Quantity) -> Self {
        self.requests.insert(resource, quantity);
        self
    }
}

/// A running instance (pod) of a workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub containers: Vec<Container>,
}

impl Instance {
    /// `namespace/name` identity used in logs
    pub fn id(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Recommended resources for one container, matched by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRecommendation {
    pub name: String,
    #[serde(default)]
    pub resources: BTreeMap<ResourceName, Quantity>,
}

/// Recommender output for a workload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub containers: Vec<ContainerRecommendation>,
}

impl Recommendation {
    pub fn for_container(&self, name: &str) -> Option<&ContainerRecommendation> {
        self.containers.iter().find(|c| c.name == name)
    }
}

/// Allowed range for one resource; either side may be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceBounds {
    #[serde(default)]
    pub min: Option<Quantity>,
    #[serde(default)]
    pub max: Option<Quantity>,
}

impl ResourceBounds {
    pub fn new(min: Option<Quantity>, max: Option<Quantity>) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: Quantity) -> Quantity {
        value.clamp_to(self.min, self.max)
    }
}

/// Bounds for the resources of one container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerPolicy {
    pub name: String,
    #[serde(default)]
    pub resources: BTreeMap<ResourceName, ResourceBounds>,
}

/// Per-container bounds applied to recommendations before they are compared
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcesPolicy {
    pub containers: Vec<ContainerPolicy>,
}

impl ResourcesPolicy {
    /// Build a policy, rejecting any bound whose min exceeds its max
    pub fn new(containers: Vec<ContainerPolicy>) -> Result<Self, ValidationError> {
        let policy = Self { containers };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for container in &self.containers {
            for (resource, bounds) in &container.resources {
                if let (Some(min), Some(max)) = (bounds.min, bounds.max) {
                    if min > max {
                        return Err(ValidationError::InvalidBounds {
                            container: container.name.clone(),
                            resource: resource.to_string(),
                            min: min.to_string(),
                            max: max.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Bounds for a container/resource pair, if the policy constrains it
    pub fn bounds(&self, container: &str, resource: ResourceName) -> Option<&ResourceBounds> {
        self.containers
            .iter()
            .find(|c| c.name == container)
            .and_then(|c| c.resources.get(&resource))
    }
}

/// Tunables for the update priority calculation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Summed relative change an instance must exceed to be updated
    #[serde(default)]
    pub min_change_threshold: f64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            min_change_threshold: 0.0,
        }
    }
}

impl UpdateConfig {
    pub fn new(min_change_threshold: f64) -> Result<Self, ValidationError> {
        let config = Self {
            min_change_threshold,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.min_change_threshold.is_finite() || self.min_change_threshold < 0.0 {
            return Err(ValidationError::InvalidThreshold(self.min_change_threshold));
        }
        Ok(())
    }
}

/// Whether the updater may act on a workload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Evict instances whose requests drifted from the recommendation
    #[default]
    Auto,
    /// Recommendations are computed but never applied
    Off,
}

/// Equality-based label selector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn new<K, V>(labels: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            match_labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// An empty selector matches everything
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.match_labels {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}

/// Autoscaling policy attached to a workload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoscalingPolicy {
    #[serde(default)]
    pub update_mode: UpdateMode,
    #[serde(default)]
    pub resources_policy: Option<ResourcesPolicy>,
    #[serde(default)]
    pub update_config: Option<UpdateConfig>,
    /// Overrides the process-wide replica floor
    #[serde(default)]
    pub min_replicas: Option<u32>,
    /// Overrides the process-wide eviction tolerance
    #[serde(default)]
    pub eviction_tolerance: Option<f64>,
}

/// An autoscaled workload as reported by the workload lister
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    pub id: WorkloadId,
    #[serde(default)]
    pub selector: LabelSelector,
    /// Current replica count
    pub replicas: u32,
    #[serde(default)]
    pub policy: AutoscalingPolicy,
}

impl Workload {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(policy) = &self.policy.resources_policy {
            policy.validate()?;
        }
        if let Some(config) = &self.policy.update_config {
            config.validate()?;
        }
        Ok(())
    }
}
