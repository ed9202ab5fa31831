//! VPA Updater - evicts pods whose resource requests drifted from their recommendation
//!
//! Runs as a single Deployment. Every pass ranks the pods of each autoscaled
//! workload and evicts the most out-of-date ones within the workload's
//! disruption budget, so they get recreated with fresh requests.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use updater_lib::{
    health::{components, HealthRegistry},
    observability::{StructuredLogger, UpdaterMetrics},
    updater::{UpdaterBuilder, UpdaterLoop},
};
use vpa_updater::{
    api,
    client::{ClusterClient, RecommendationApiClient},
    config::UpdaterConfig,
};

const UPDATER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Passes missed before the updater reports itself unhealthy
const MISSED_TICKS_UNHEALTHY: u32 = 3;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting vpa-updater");

    let config = UpdaterConfig::load()?;
    info!(
        node_name = %config.node_name,
        interval_secs = config.updater_interval_secs,
        cache_ttl_secs = config.recommendation_cache_ttl_secs,
        min_replicas = config.min_replicas,
        eviction_tolerance = config.eviction_tolerance,
        "Updater configured"
    );

    let health_registry = HealthRegistry::new()
        .with_tick_deadline(config.updater_interval() * MISSED_TICKS_UNHEALTHY);
    health_registry.register(components::UPDATER).await;
    health_registry.register(components::RECOMMENDER).await;
    health_registry.register(components::CLUSTER).await;

    let metrics = UpdaterMetrics::new();

    let logger = StructuredLogger::new(&config.node_name);
    logger.log_startup(UPDATER_VERSION, config.updater_interval_secs);

    let recommendations = Arc::new(RecommendationApiClient::new(
        &config.recommendation_api_endpoint,
        config.request_timeout(),
    )?);
    let cluster = Arc::new(ClusterClient::new(
        &config.apiserver_endpoint,
        config.request_timeout(),
    )?);

    let updater = UpdaterBuilder::new()
        .workload_lister(recommendations.clone())
        .recommender(recommendations)
        .instance_lister(cluster.clone())
        .eviction_controller(cluster)
        .cache_ttl(config.cache_ttl())
        .limiter(config.limiter()?)
        .logger(logger.clone())
        .build()?;

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics));

    // Start health and metrics server
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let updater_loop = UpdaterLoop::new(updater, config.updater_interval())
        .with_health(health_registry.clone());
    let loop_handle = tokio::spawn(updater_loop.run(shutdown_rx));

    health_registry.set_ready(true).await;

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());
    if let Err(e) = loop_handle.await {
        warn!(error = %e, "Updater loop terminated abnormally");
    }
    api_handle.abort();

    Ok(())
}
