//! Fixture builders shared by the unit tests

use crate::models::{
    AutoscalingPolicy, Container, ContainerPolicy, ContainerRecommendation, Instance,
    LabelSelector, Recommendation, ResourceBounds, ResourcesPolicy, Workload, WorkloadId,
};
use crate::resource::{Quantity, ResourceName};
use std::collections::BTreeMap;

pub const CONTAINER_NAME: &str = "container1";

pub fn quantity(s: &str) -> Quantity {
    s.parse().expect("test quantity")
}

/// Request map with the given cpu/memory values; empty strings are left out
pub fn resources(cpu: &str, memory: &str) -> BTreeMap<ResourceName, Quantity> {
    let mut map = BTreeMap::new();
    if !cpu.is_empty() {
        map.insert(ResourceName::Cpu, quantity(cpu));
    }
    if !memory.is_empty() {
        map.insert(ResourceName::Memory, quantity(memory));
    }
    map
}

pub fn container(name: &str, cpu: &str, memory: &str) -> Container {
    Container {
        name: name.to_string(),
        requests: resources(cpu, memory),
    }
}

pub fn instance(name: &str, container_name: &str, cpu: &str, memory: &str) -> Instance {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), "test".to_string());
    Instance {
        namespace: "default".to_string(),
        name: name.to_string(),
        labels,
        containers: vec![container(container_name, cpu, memory)],
    }
}

pub fn recommendation(container_name: &str, cpu: &str, memory: &str) -> Recommendation {
    Recommendation {
        containers: vec![ContainerRecommendation {
            name: container_name.to_string(),
            resources: resources(cpu, memory),
        }],
    }
}

pub fn policy(
    container_name: &str,
    min_cpu: &str,
    max_cpu: &str,
    min_memory: &str,
    max_memory: &str,
) -> ResourcesPolicy {
    let mut resources = BTreeMap::new();
    resources.insert(
        ResourceName::Cpu,
        ResourceBounds::new(Some(quantity(min_cpu)), Some(quantity(max_cpu))),
    );
    resources.insert(
        ResourceName::Memory,
        ResourceBounds::new(Some(quantity(min_memory)), Some(quantity(max_memory))),
    );
    ResourcesPolicy::new(vec![ContainerPolicy {
        name: container_name.to_string(),
        resources,
    }])
    .expect("test policy")
}

pub fn workload(name: &str, replicas: u32) -> Workload {
    Workload {
        id: WorkloadId::new("default", name),
        selector: LabelSelector::new([("app", name)]),
        replicas,
        policy: AutoscalingPolicy::default(),
    }
}
