// Worker status records and processed/failed counters
//
// Per-worker records are ephemeral: every write re-arms their expiry so state
// left behind by a crashed worker disappears on its own. The global processed
// counter is permanent. The global failed count is the length of the failed
// queue, not a counter.

use crate::client::ResqClient;
use crate::codec;
use crate::errors::{ResqError, StoreError};
use crate::models::{JobPayload, StatusRecord};
use crate::registry::validate_worker_id;
use crate::store::Batch;
use chrono::Utc;
use tracing::{debug, instrument};

impl ResqClient {
    /// Record that `worker_id` is about to run `payload` from `queue`
    #[instrument(skip(self, payload), fields(class = %payload.class))]
    pub async fn set_worker_status(
        &self,
        worker_id: &str,
        queue: &str,
        payload: &JobPayload,
    ) -> Result<(), ResqError> {
        validate_worker_id(worker_id)?;
        let record = StatusRecord {
            queue: queue.to_string(),
            run_at: Utc::now(),
            payload: payload.clone(),
        };

        let mut batch = Batch::new();
        batch.set_ephemeral(
            self.keys.worker_status(worker_id),
            codec::encode(&record)?,
            self.record_ttl,
        );
        self.store.execute(batch).await?;

        debug!("Worker status set");
        Ok(())
    }

    /// Mark `worker_id` idle without waiting for its status record to expire
    pub async fn clear_worker_status(&self, worker_id: &str) -> Result<(), ResqError> {
        self.store
            .delete(&self.keys.worker_status(worker_id))
            .await?;
        Ok(())
    }

    /// Count one finished job attempt, globally and for `worker_id` if given
    #[instrument(skip(self))]
    pub async fn incr_processed(&self, worker_id: Option<&str>) -> Result<(), ResqError> {
        if let Some(id) = worker_id {
            validate_worker_id(id)?;
        }

        let mut batch = Batch::new();
        batch.incr(self.keys.processed(), 1);
        if let Some(id) = worker_id {
            batch.incr_ephemeral(self.keys.worker_processed(id), self.record_ttl);
        }
        self.store.execute(batch).await?;
        Ok(())
    }

    /// Processed count, global or for one worker. Absent counters read as 0.
    pub async fn processed(&self, worker_id: Option<&str>) -> Result<i64, ResqError> {
        let key = match worker_id {
            Some(id) => self.keys.worker_processed(id),
            None => self.keys.processed(),
        };
        self.read_counter(&key).await
    }

    /// Count one failed attempt for `worker_id`.
    ///
    /// There is no global failed counter, so this is a no-op without a worker.
    #[instrument(skip(self))]
    pub async fn incr_failed(&self, worker_id: Option<&str>) -> Result<(), ResqError> {
        let Some(id) = worker_id else {
            return Ok(());
        };
        validate_worker_id(id)?;

        let mut batch = Batch::new();
        batch.incr_ephemeral(self.keys.worker_failed(id), self.record_ttl);
        self.store.execute(batch).await?;
        Ok(())
    }

    /// Failed count for one worker, or the length of the failed queue
    pub async fn failed(&self, worker_id: Option<&str>) -> Result<i64, ResqError> {
        match worker_id {
            Some(id) => self.read_counter(&self.keys.worker_failed(id)).await,
            None => Ok(i64::try_from(self.failure_count().await?).unwrap_or(i64::MAX)),
        }
    }

    pub async fn clear_processed_for(&self, worker_id: &str) -> Result<(), ResqError> {
        self.store
            .delete(&self.keys.worker_processed(worker_id))
            .await?;
        Ok(())
    }

    pub async fn clear_failed_for(&self, worker_id: &str) -> Result<(), ResqError> {
        self.store
            .delete(&self.keys.worker_failed(worker_id))
            .await?;
        Ok(())
    }

    async fn read_counter(&self, key: &str) -> Result<i64, ResqError> {
        match self.store.get(key).await? {
            None => Ok(0),
            Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
                ResqError::Store(StoreError::NotAnInteger(format!(
                    "counter {} holds {:?}",
                    key, raw
                )))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkerState;
    use crate::store::{KeyValueStore, MemoryStore, MockKeyValueStore, Mutation};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    const WORKER: &str = "host:1:mailer";

    fn client() -> (Arc<MemoryStore>, ResqClient) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), ResqClient::new(store))
    }

    #[tokio::test]
    async fn test_status_toggles_worker_state() {
        let (store, client) = client();
        let payload = JobPayload::new("Send", vec![json!("a@b.com")]);

        assert_eq!(client.worker_state(WORKER).await.unwrap(), WorkerState::Idle);

        client
            .set_worker_status(WORKER, "mailer", &payload)
            .await
            .unwrap();
        assert_eq!(client.worker_state(WORKER).await.unwrap(), WorkerState::Working);
        assert!(store.ttl(&client.keys().worker_status(WORKER)).is_some());

        client.clear_worker_status(WORKER).await.unwrap();
        assert_eq!(client.worker_state(WORKER).await.unwrap(), WorkerState::Idle);
    }

    #[tokio::test]
    async fn test_status_record_expires_without_clear() {
        let store = Arc::new(MemoryStore::new());
        let client = ResqClient::new(store).with_record_ttl(Duration::from_millis(30));
        let payload = JobPayload::new("Send", vec![]);

        client
            .set_worker_status(WORKER, "mailer", &payload)
            .await
            .unwrap();
        assert_eq!(client.worker_state(WORKER).await.unwrap(), WorkerState::Working);

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(client.worker_state(WORKER).await.unwrap(), WorkerState::Idle);
        assert!(client.worker_status(WORKER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_worker_status_pairs_value_with_expiry() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_execute()
            .times(1)
            .withf(|batch| {
                let mutations: Vec<&Mutation> = batch.iter().collect();
                matches!(
                    mutations.as_slice(),
                    [Mutation::Set { .. }, Mutation::Expire { ttl, .. }]
                        if *ttl == Duration::from_secs(3600)
                )
            })
            .returning(|_| Ok(()));
        let client = ResqClient::new(Arc::new(store));

        client
            .set_worker_status(WORKER, "mailer", &JobPayload::new("Send", vec![]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_processed_counts_global_and_worker() {
        let (store, client) = client();
        assert_eq!(client.processed(None).await.unwrap(), 0);
        assert_eq!(client.processed(Some(WORKER)).await.unwrap(), 0);

        client.incr_processed(Some(WORKER)).await.unwrap();
        client.incr_processed(Some(WORKER)).await.unwrap();
        client.incr_processed(None).await.unwrap();

        assert_eq!(client.processed(None).await.unwrap(), 3);
        assert_eq!(client.processed(Some(WORKER)).await.unwrap(), 2);

        // Only the per-worker counter is ephemeral.
        assert!(store.ttl(&client.keys().processed()).is_none());
        assert!(store.ttl(&client.keys().worker_processed(WORKER)).is_some());
    }

    #[tokio::test]
    async fn test_incr_failed_without_worker_is_noop() {
        let mut store = MockKeyValueStore::new();
        store.expect_execute().times(0);
        let client = ResqClient::new(Arc::new(store));

        client.incr_failed(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_blank_worker_id_is_rejected_before_any_write() {
        let mut store = MockKeyValueStore::new();
        store.expect_execute().times(0);
        let client = ResqClient::new(Arc::new(store));
        let payload = JobPayload::new("Send", vec![]);

        for id in ["", "  "] {
            let err = client.set_worker_status(id, "mailer", &payload).await.unwrap_err();
            assert!(matches!(err, ResqError::InvalidName { .. }));
            let err = client.incr_processed(Some(id)).await.unwrap_err();
            assert!(matches!(err, ResqError::InvalidName { .. }));
            let err = client.incr_failed(Some(id)).await.unwrap_err();
            assert!(matches!(err, ResqError::InvalidName { .. }));
        }
    }

    #[tokio::test]
    async fn test_failed_per_worker_and_global_are_separate() {
        let (_, client) = client();
        client.incr_failed(Some(WORKER)).await.unwrap();
        client.incr_failed(Some(WORKER)).await.unwrap();

        assert_eq!(client.failed(Some(WORKER)).await.unwrap(), 2);
        // The global count comes from the failed queue, which is still empty.
        assert_eq!(client.failed(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_worker_counters_expire() {
        let store = Arc::new(MemoryStore::new());
        let client = ResqClient::new(store).with_record_ttl(Duration::from_millis(30));
        client.incr_processed(Some(WORKER)).await.unwrap();
        client.incr_failed(Some(WORKER)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(client.processed(Some(WORKER)).await.unwrap(), 0);
        assert_eq!(client.failed(Some(WORKER)).await.unwrap(), 0);
        assert_eq!(client.processed(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear_counters() {
        let (_, client) = client();
        client.incr_processed(Some(WORKER)).await.unwrap();
        client.incr_failed(Some(WORKER)).await.unwrap();

        client.clear_processed_for(WORKER).await.unwrap();
        client.clear_failed_for(WORKER).await.unwrap();

        assert_eq!(client.processed(Some(WORKER)).await.unwrap(), 0);
        assert_eq!(client.failed(Some(WORKER)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_garbage_counter_is_an_error() {
        let (store, client) = client();
        store.set(&client.keys().processed(), "lots").await.unwrap();

        let err = client.processed(None).await.unwrap_err();
        assert!(matches!(err, ResqError::Store(StoreError::NotAnInteger(_))));
    }
}
