// Client handle shared by producers and workers

use crate::config::QueueConfig;
use crate::errors::ResqError;
use crate::keys::KeyNamespace;
use crate::models::Info;
use crate::store::KeyValueStore;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Default lifetime of per-worker records
pub const DEFAULT_RECORD_TTL: Duration = Duration::from_secs(3600);

/// Entry point of the queue protocol.
///
/// Holds the store handle, the key layout, the lifetime applied to every
/// per-worker record, and the set of queues this instance has already
/// registered. Clones share that set. The set only saves round-trips;
/// registration is idempotent in the store regardless.
///
/// Operations are grouped by concern in `queue`, `registry`, `stats` and
/// `failure`.
#[derive(Clone)]
pub struct ResqClient {
    pub(crate) store: Arc<dyn KeyValueStore>,
    pub(crate) keys: KeyNamespace,
    pub(crate) record_ttl: Duration,
    pub(crate) watched: Arc<Mutex<HashSet<String>>>,
}

impl std::fmt::Debug for ResqClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResqClient")
            .field("namespace", &self.keys.root())
            .field("record_ttl", &self.record_ttl)
            .finish_non_exhaustive()
    }
}

impl ResqClient {
    /// Create a client with the default namespace and record lifetime
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            keys: KeyNamespace::default(),
            record_ttl: DEFAULT_RECORD_TTL,
            watched: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Create a client from the `[queue]` configuration section
    pub fn from_config(store: Arc<dyn KeyValueStore>, config: &QueueConfig) -> Self {
        Self::new(store)
            .with_namespace(config.namespace.clone())
            .with_record_ttl(config.record_ttl())
    }

    pub fn with_namespace(mut self, root: impl Into<String>) -> Self {
        self.keys = KeyNamespace::new(root);
        self
    }

    /// Lifetime of worker started/status records and per-worker counters
    pub fn with_record_ttl(mut self, ttl: Duration) -> Self {
        self.record_ttl = ttl;
        self
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn keys(&self) -> &KeyNamespace {
        &self.keys
    }

    pub fn record_ttl(&self) -> Duration {
        self.record_ttl
    }

    /// Round-trip to the store
    pub async fn health_check(&self) -> Result<(), ResqError> {
        self.store.ping().await?;
        Ok(())
    }

    /// Summary of queues, workers and counters
    #[instrument(skip(self))]
    pub async fn info(&self) -> Result<Info, ResqError> {
        let queues = self.queues().await?;
        let mut pending = 0;
        for queue in &queues {
            pending += self.size(queue).await?;
        }

        Ok(Info {
            pending,
            processed: self.processed(None).await?,
            queues: queues.len(),
            workers: self.workers().await?.len(),
            working: self.working().await?.len(),
            failed: self.failure_count().await?,
        })
    }
}
