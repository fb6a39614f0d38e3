// Bootstrap helpers for processes embedding the queue client
// Used by producers and worker binaries to wire settings into live handles

use crate::client::ResqClient;
use crate::config::Settings;
use crate::store::{KeyValueStore, RedisStore};
use crate::telemetry;
use crate::worker::{HandlerRegistry, Worker};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Initialize logging and, when a port is configured, the metrics exporter
pub fn init_observability(settings: &Settings) -> Result<()> {
    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.json_logs,
    )?;

    if let Some(port) = settings.observability.metrics_port {
        telemetry::init_metrics(port)?;
    }
    Ok(())
}

/// Connect to Redis using the `[redis]` section
///
/// # Errors
/// Returns error if the URL is invalid or the server cannot be reached in time
#[tracing::instrument(skip(settings))]
pub async fn init_redis_store(settings: &Settings) -> Result<RedisStore> {
    info!("Initializing Redis store");

    let store = RedisStore::new(&settings.redis)
        .await
        .context("Failed to initialize Redis store")?;

    store
        .ping()
        .await
        .context("Redis store did not answer PING")?;

    info!("Redis store initialized");
    Ok(store)
}

/// Validate settings, connect, and build a client for the configured namespace
///
/// # Errors
/// Returns error on invalid settings or when Redis is unreachable
#[tracing::instrument(skip(settings))]
pub async fn init_client(settings: &Settings) -> Result<ResqClient> {
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let store = init_redis_store(settings).await?;
    let client = ResqClient::from_config(Arc::new(store), &settings.queue);

    info!(namespace = %client.keys().root(), "Queue client initialized");
    Ok(client)
}

/// Build a worker for the configured queues
///
/// # Errors
/// Returns error when no queue is configured
pub fn init_worker(
    settings: &Settings,
    client: ResqClient,
    handlers: HandlerRegistry,
) -> Result<Worker> {
    if settings.worker.queues.is_empty() {
        anyhow::bail!("worker.queues must name at least one queue");
    }

    let worker = Worker::from_config(client, &settings.worker, handlers);
    info!(worker_id = %worker.id(), "Worker initialized");
    Ok(worker)
}
