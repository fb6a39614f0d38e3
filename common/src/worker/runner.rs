// Polling worker: reserves jobs from its queues and runs the matching handler

use crate::client::ResqClient;
use crate::config::WorkerConfig;
use crate::errors::ResqError;
use crate::job::Job;
use crate::telemetry;
use crate::worker::handler::HandlerRegistry;
use rand::Rng;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

/// Default sleep between polls when every queue is empty
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound of the backoff applied after consecutive store errors
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Jitter added to each backoff (10%)
const JITTER_FACTOR: f64 = 0.1;

/// A single worker process polling an ordered list of queues.
///
/// Queues are checked in order on every poll, so earlier queues take
/// priority. Each reserved job is executed in place; the worker handles one
/// job at a time.
#[derive(Debug)]
pub struct Worker {
    client: ResqClient,
    id: String,
    queues: Vec<String>,
    handlers: HandlerRegistry,
    poll_interval: Duration,
}

impl Worker {
    /// Create a worker identified as `host:pid:queue1,queue2`
    pub fn new(client: ResqClient, queues: Vec<String>, handlers: HandlerRegistry) -> Self {
        let id = worker_id(&default_hostname(), std::process::id(), &queues);
        Self {
            client,
            id,
            queues,
            handlers,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Create a worker from the `[worker]` configuration section
    pub fn from_config(client: ResqClient, config: &WorkerConfig, handlers: HandlerRegistry) -> Self {
        let host = config.hostname.clone().unwrap_or_else(default_hostname);
        let id = worker_id(&host, std::process::id(), &config.queues);
        Self {
            client,
            id,
            queues: config.queues.clone(),
            handlers,
            poll_interval: config.poll_interval(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    /// Reserve and run at most one job.
    ///
    /// Returns `Ok(true)` when a job was processed, `Ok(false)` when every
    /// queue was empty. Handler failures are recorded as failed jobs and do
    /// not surface here; store and decode failures do.
    pub async fn work_once(&self) -> Result<bool, ResqError> {
        for queue in &self.queues {
            if let Some(job) = self.client.reserve(queue).await? {
                self.process(job).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Run one reserved job and report its outcome
    #[instrument(skip(self, job), fields(worker_id = %self.id, queue = %job.queue(), class = %job.class()))]
    pub async fn process(&self, job: Job) -> Result<(), ResqError> {
        job.start(&self.id).await?;

        let started = Instant::now();
        let outcome = match self.handlers.get(job.class()) {
            Some(handler) => handler.perform(job.args()).await,
            None => Err(anyhow::anyhow!(
                "no handler registered for job class {}",
                job.class()
            )),
        };
        telemetry::record_job_duration(
            job.queue(),
            job.class(),
            started.elapsed().as_secs_f64(),
        );

        match outcome {
            Ok(()) => job.complete(&self.id).await,
            Err(e) => job.fail(&self.id, &e).await,
        }
    }

    /// Register, poll until `shutdown` flips to true, then unregister.
    ///
    /// Store errors never end the loop; the worker backs off with jitter and
    /// keeps polling. A job in progress is always finished before shutting
    /// down.
    #[instrument(skip(self, shutdown), fields(worker_id = %self.id))]
    pub async fn work(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), ResqError> {
        self.client.add_worker(&self.id).await?;
        info!(queues = ?self.queues, "Worker started");

        let mut consecutive_errors: u32 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }

            let pause = match self.work_once().await {
                Ok(true) => {
                    consecutive_errors = 0;
                    continue;
                }
                Ok(false) => {
                    consecutive_errors = 0;
                    self.poll_interval
                }
                Err(e) => {
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    let delay = backoff_delay(self.poll_interval, consecutive_errors);
                    if e.is_connectivity() {
                        warn!(error = %e, delay_ms = delay.as_millis() as u64, "Store unavailable, backing off");
                    } else {
                        error!(error = %e, delay_ms = delay.as_millis() as u64, "Poll failed, backing off");
                    }
                    delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("Shutdown sender dropped");
                        break;
                    }
                }
            }
        }

        info!("Shutdown requested, stopping worker");
        self.client.remove_worker(&self.id).await?;
        info!("Worker stopped");
        Ok(())
    }
}

/// `host:pid:queue1,queue2`
pub fn worker_id(host: &str, pid: u32, queues: &[String]) -> String {
    format!("{}:{}:{}", host, pid, queues.join(","))
}

fn default_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Exponential backoff from the poll interval, capped, with jitter
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = base
        .saturating_mul(2_u32.saturating_pow(exponent))
        .min(MAX_BACKOFF);

    let jitter_range_ms = (delay.as_millis() as f64 * JITTER_FACTOR) as u64;
    let jitter_ms = if jitter_range_ms > 0 {
        rand::thread_rng().gen_range(0..=jitter_range_ms)
    } else {
        0
    };

    delay + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use crate::models::WorkerState;
    use crate::store::{KeyValueStore, MemoryStore, MockKeyValueStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const WORKER: &str = "host:1:mailer,billing";

    fn queues() -> Vec<String> {
        vec!["mailer".to_string(), "billing".to_string()]
    }

    fn registry(calls: Arc<AtomicUsize>) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry
            .register_fn("Send", move |_| {
                let calls = calls.clone();
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .register_fn("Explode", |_| {
                Box::pin(async { Err(anyhow::anyhow!("kaboom")) })
            });
        registry
    }

    #[test]
    fn test_worker_id_format() {
        assert_eq!(worker_id("box", 42, &queues()), "box:42:mailer,billing");
    }

    #[test]
    fn test_from_config_uses_configured_host_and_interval() {
        let client = ResqClient::new(Arc::new(MemoryStore::new()));
        let config = WorkerConfig {
            queues: queues(),
            poll_interval_ms: 250,
            hostname: Some("box".to_string()),
        };
        let worker = Worker::from_config(client, &config, HandlerRegistry::new());

        assert_eq!(
            worker.id(),
            format!("box:{}:mailer,billing", std::process::id())
        );
        assert_eq!(worker.queues(), queues().as_slice());
        assert_eq!(worker.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let base = Duration::from_millis(100);
        let first = backoff_delay(base, 1);
        assert!(first >= base && first <= Duration::from_millis(110));

        let third = backoff_delay(base, 3);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(440));

        let capped = backoff_delay(base, 30);
        assert!(capped >= MAX_BACKOFF && capped <= MAX_BACKOFF + MAX_BACKOFF / 10);
    }

    #[tokio::test]
    async fn test_work_once_respects_queue_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = ResqClient::new(Arc::new(MemoryStore::new()));
        client.enqueue("billing", "Send", vec![json!(2)]).await.unwrap();
        client.enqueue("mailer", "Send", vec![json!(1)]).await.unwrap();

        let worker = Worker::new(client.clone(), queues(), registry(calls.clone())).with_id(WORKER);

        assert!(worker.work_once().await.unwrap());
        assert_eq!(client.size("mailer").await.unwrap(), 0);
        assert_eq!(client.size("billing").await.unwrap(), 1);

        assert!(worker.work_once().await.unwrap());
        assert!(!worker.work_once().await.unwrap());

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(client.processed(Some(WORKER)).await.unwrap(), 2);
        assert_eq!(client.worker_state(WORKER).await.unwrap(), WorkerState::Idle);
    }

    #[tokio::test]
    async fn test_handler_error_becomes_failure_record() {
        let client = ResqClient::new(Arc::new(MemoryStore::new()));
        client.enqueue("mailer", "Explode", vec![]).await.unwrap();
        let worker = Worker::new(client.clone(), queues(), registry(Arc::default())).with_id(WORKER);

        assert!(worker.work_once().await.unwrap());

        let failures = client.failures(0, 1).await.unwrap();
        assert_eq!(failures[0].error, "kaboom");
        assert_eq!(failures[0].worker, WORKER);
        assert_eq!(client.failed(Some(WORKER)).await.unwrap(), 1);
        assert_eq!(client.processed(Some(WORKER)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_class_fails_the_job() {
        let client = ResqClient::new(Arc::new(MemoryStore::new()));
        client.enqueue("mailer", "Mystery", vec![]).await.unwrap();
        let worker = Worker::new(client.clone(), queues(), HandlerRegistry::new()).with_id(WORKER);

        assert!(worker.work_once().await.unwrap());

        let failures = client.failures(0, 1).await.unwrap();
        assert!(failures[0].error.contains("Mystery"));
        assert_eq!(failures[0].payload.class, "Mystery");
    }

    #[tokio::test]
    async fn test_work_once_surfaces_store_errors() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_list_pop()
            .returning(|_| Err(StoreError::ConnectionFailed("refused".to_string())));
        let client = ResqClient::new(Arc::new(store));
        let worker = Worker::new(client, queues(), HandlerRegistry::new());

        let err = worker.work_once().await.unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_work_registers_drains_and_unregisters() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(MemoryStore::new());
        let client = ResqClient::new(store.clone());
        for i in 0..3 {
            client.enqueue("mailer", "Send", vec![json!(i)]).await.unwrap();
        }

        let worker = Arc::new(
            Worker::new(client.clone(), queues(), registry(calls.clone()))
                .with_id(WORKER)
                .with_poll_interval(Duration::from_millis(10)),
        );
        let (tx, rx) = watch::channel(false);
        let running = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.work(rx).await })
        };

        let mut registered = false;
        for _ in 0..100 {
            if calls.load(Ordering::SeqCst) == 3 {
                registered = client.is_worker(WORKER).await.unwrap();
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(registered);

        tx.send(true).unwrap();
        running.await.unwrap().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!client.is_worker(WORKER).await.unwrap());
        assert_eq!(client.processed(None).await.unwrap(), 3);
        assert_eq!(client.processed(Some(WORKER)).await.unwrap(), 0);
        assert!(store
            .get(&client.keys().worker_started(WORKER))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_work_stops_when_sender_dropped() {
        let client = ResqClient::new(Arc::new(MemoryStore::new()));
        let worker = Worker::new(client.clone(), queues(), HandlerRegistry::new())
            .with_id(WORKER)
            .with_poll_interval(Duration::from_secs(30));
        let (tx, rx) = watch::channel(false);

        let running = tokio::spawn(async move { worker.work(rx).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(tx);

        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(client.workers().await.unwrap().is_empty());
    }
}
