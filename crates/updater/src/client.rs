//! HTTP collaborators for the updater
//!
//! [`RecommendationApiClient`] talks to the Recommendation API for the list of
//! autoscaled workloads and their recommendations. [`ClusterClient`] talks to
//! the Kubernetes API server for pods and evictions.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};
use updater_lib::{
    eviction::EvictionController,
    listers::{InstanceLister, WorkloadLister},
    recommendation::RecommenderSource,
    Container, Instance, LabelSelector, Quantity, Recommendation, ResourceName, Workload,
    WorkloadId,
};
use url::Url;

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Parse a base URL so that relative joins append to its path
fn base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw).with_context(|| format!("Invalid URL '{raw}'"))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

async fn get_json<T: DeserializeOwned>(client: &Client, url: Url) -> Result<T> {
    let response = client
        .get(url)
        .send()
        .await
        .context("Failed to send request")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("API error ({}): {}", status, body);
    }

    response.json().await.context("Failed to parse response")
}

/// Client for the Recommendation API
pub struct RecommendationApiClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct WorkloadList {
    workloads: Vec<Workload>,
}

impl RecommendationApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: self::base_url(base_url)?,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;
        get_json(&self.client, url).await
    }
}

#[async_trait]
impl WorkloadLister for RecommendationApiClient {
    async fn list(&self) -> Result<Vec<Workload>> {
        let list: WorkloadList = self.get("api/v1/workloads").await?;
        Ok(list.workloads)
    }
}

#[async_trait]
impl RecommenderSource for RecommendationApiClient {
    async fn get_recommendation(&self, workload: &WorkloadId) -> Result<Recommendation> {
        self.get(&format!(
            "api/v1/workloads/{}/{}/recommendation",
            workload.namespace, workload.name
        ))
        .await
        .with_context(|| format!("Failed to fetch recommendation for {workload}"))
    }
}

// Subset of the core/v1 Pod schema the updater reads

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMeta {
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    deletion_timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ResourceRequirements {
    #[serde(default)]
    requests: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContainerSpec {
    name: String,
    #[serde(default)]
    resources: ResourceRequirements,
}

#[derive(Debug, Clone, Deserialize)]
struct PodSpec {
    #[serde(default)]
    containers: Vec<ContainerSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PodStatus {
    #[serde(default)]
    phase: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Pod {
    metadata: ObjectMeta,
    spec: PodSpec,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Deserialize)]
struct PodList {
    items: Vec<Pod>,
}

impl Pod {
    /// Running and not already on its way out
    fn is_evictable(&self) -> bool {
        self.status.phase.as_deref() == Some("Running") && self.metadata.deletion_timestamp.is_none()
    }

    /// Map to an [`Instance`], keeping only the resources the updater ranks on
    fn into_instance(self) -> Result<Instance> {
        let pod_name = self.metadata.name;
        let mut containers = Vec::with_capacity(self.spec.containers.len());

        for spec in self.spec.containers {
            let mut container = Container::new(spec.name);
            for (resource, raw) in spec.resources.requests {
                let Ok(resource) = resource.parse::<ResourceName>() else {
                    continue;
                };
                let quantity: Quantity = raw.parse().with_context(|| {
                    format!("Pod {pod_name} container {} {resource} request", container.name)
                })?;
                container = container.with_request(resource, quantity);
            }
            containers.push(container);
        }

        Ok(Instance {
            namespace: self.metadata.namespace,
            name: pod_name,
            labels: self.metadata.labels,
            containers,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvictionBody<'a> {
    api_version: &'static str,
    kind: &'static str,
    metadata: EvictionMeta<'a>,
}

#[derive(Debug, Serialize)]
struct EvictionMeta<'a> {
    name: &'a str,
    namespace: &'a str,
}

/// Client for the Kubernetes API server, used directly or through `kubectl proxy`
pub struct ClusterClient {
    client: Client,
    base_url: Url,
}

impl ClusterClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: self::base_url(base_url)?,
        })
    }

    fn pod_url(&self, namespace: &str, name: &str) -> Result<Url> {
        self.base_url
            .join(&format!("api/v1/namespaces/{namespace}/pods/{name}"))
            .context("Invalid pod path")
    }
}

#[async_trait]
impl InstanceLister for ClusterClient {
    async fn list(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<Instance>> {
        let mut url = self
            .base_url
            .join(&format!("api/v1/namespaces/{namespace}/pods"))
            .context("Invalid path")?;
        if !selector.match_labels.is_empty() {
            url.query_pairs_mut()
                .append_pair("labelSelector", &selector.to_string());
        }

        let pods: PodList = get_json(&self.client, url)
            .await
            .with_context(|| format!("Failed to list pods in {namespace} for {selector}"))?;

        pods.items.into_iter().map(Pod::into_instance).collect()
    }
}

#[async_trait]
impl EvictionController for ClusterClient {
    async fn can_evict(&self, instance: &Instance) -> bool {
        let url = match self.pod_url(&instance.namespace, &instance.name) {
            Ok(url) => url,
            Err(e) => {
                warn!(instance = %instance.id(), error = %e, "Cannot build pod URL");
                return false;
            }
        };

        match get_json::<Pod>(&self.client, url).await {
            Ok(pod) => pod.is_evictable(),
            Err(e) => {
                debug!(instance = %instance.id(), error = %format!("{e:#}"), "Pod lookup failed, not evicting");
                false
            }
        }
    }

    async fn evict(&self, instance: &Instance) -> Result<()> {
        let url = self
            .base_url
            .join(&format!(
                "api/v1/namespaces/{}/pods/{}/eviction",
                instance.namespace, instance.name
            ))
            .context("Invalid eviction path")?;

        let body = EvictionBody {
            api_version: "policy/v1",
            kind: "Eviction",
            metadata: EvictionMeta {
                name: &instance.name,
                namespace: &instance.namespace,
            },
        };

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("Failed to send eviction request")?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS {
            anyhow::bail!("Eviction of {} blocked by disruption budget: {}", instance.id(), body);
        }
        anyhow::bail!("Eviction of {} failed ({}): {}", instance.id(), status, body);
    }
}
