//! Updater configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use updater_lib::eviction::{EvictionLimiter, DEFAULT_EVICTION_TOLERANCE, DEFAULT_MIN_REPLICAS};

/// Updater configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpdaterConfig {
    /// Pod/node identity reported in structured logs
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// How often the updater runs
    #[serde(default = "default_updater_interval")]
    pub updater_interval_secs: u64,

    /// TTL for cached recommendations
    #[serde(default = "default_cache_ttl")]
    pub recommendation_cache_ttl_secs: u64,

    /// Minimum number of replicas to perform an update
    #[serde(default = "default_min_replicas")]
    pub min_replicas: u32,

    /// Fraction of replica count that can be evicted in one pass
    #[serde(default = "default_eviction_tolerance")]
    pub eviction_tolerance: f64,

    /// Recommendation API endpoint
    #[serde(default = "default_recommendation_api_endpoint")]
    pub recommendation_api_endpoint: String,

    /// Kubernetes API server (or `kubectl proxy`) endpoint
    #[serde(default = "default_apiserver_endpoint")]
    pub apiserver_endpoint: String,

    /// Timeout applied to every collaborator request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_updater_interval() -> u64 {
    60
}

fn default_cache_ttl() -> u64 {
    120
}

fn default_min_replicas() -> u32 {
    DEFAULT_MIN_REPLICAS
}

fn default_eviction_tolerance() -> f64 {
    DEFAULT_EVICTION_TOLERANCE
}

fn default_recommendation_api_endpoint() -> String {
    "http://recommendation-api:9090".to_string()
}

fn default_apiserver_endpoint() -> String {
    "http://127.0.0.1:8001".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl UpdaterConfig {
    /// Load configuration from an optional `updater.{toml,json,yaml}` file
    /// and `UPDATER_*` environment variables (environment wins).
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("updater").required(false))
            .add_source(config::Environment::with_prefix("UPDATER").try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        Self::from_config(config)
    }

    pub fn from_config(config: config::Config) -> Result<Self> {
        let parsed: Self = config
            .try_deserialize()
            .context("Failed to parse configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<()> {
        if self.updater_interval_secs == 0 {
            anyhow::bail!("updater_interval_secs must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than zero");
        }
        self.limiter()?;
        Ok(())
    }

    pub fn limiter(&self) -> Result<EvictionLimiter> {
        Ok(EvictionLimiter::new(
            self.min_replicas,
            self.eviction_tolerance,
        )?)
    }

    pub fn updater_interval(&self) -> Duration {
        Duration::from_secs(self.updater_interval_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.recommendation_cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
