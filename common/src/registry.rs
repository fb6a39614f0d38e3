// Worker registry: known-worker set plus TTL-bounded liveness records
//
// Set membership means "known". Liveness comes only from record presence: a
// worker may stay in the set after its started/status records have expired.

use crate::client::ResqClient;
use crate::codec;
use crate::errors::ResqError;
use crate::models::{StatusRecord, WorkerState};
use crate::store::Batch;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::{info, instrument};

pub(crate) fn validate_worker_id(worker_id: &str) -> Result<(), ResqError> {
    if worker_id.trim().is_empty() {
        return Err(ResqError::invalid_name("worker", worker_id, "must not be empty"));
    }
    Ok(())
}

impl ResqClient {
    /// Register a worker and stamp its start time in one atomic batch
    #[instrument(skip(self))]
    pub async fn add_worker(&self, worker_id: &str) -> Result<(), ResqError> {
        validate_worker_id(worker_id)?;

        let mut batch = Batch::new();
        batch.set_add(self.keys.workers(), worker_id).set_ephemeral(
            self.keys.worker_started(worker_id),
            codec::encode_timestamp(Utc::now()),
            self.record_ttl,
        );
        self.store.execute(batch).await?;

        info!(worker_id = %worker_id, "Worker registered");
        Ok(())
    }

    /// Forget a worker.
    ///
    /// Clears its counters first so it never shows up in listings with stale
    /// stats. Not atomic: a crash half-way leaves only TTL-bounded leftovers.
    #[instrument(skip(self))]
    pub async fn remove_worker(&self, worker_id: &str) -> Result<(), ResqError> {
        self.clear_processed_for(worker_id).await?;
        self.clear_failed_for(worker_id).await?;
        self.store
            .delete(&self.keys.worker_started(worker_id))
            .await?;
        self.store
            .set_remove(&self.keys.workers(), worker_id)
            .await?;

        info!(worker_id = %worker_id, "Worker unregistered");
        Ok(())
    }

    /// Known worker identities
    pub async fn workers(&self) -> Result<BTreeSet<String>, ResqError> {
        Ok(self.store.set_members(&self.keys.workers()).await?)
    }

    pub async fn is_worker(&self, worker_id: &str) -> Result<bool, ResqError> {
        Ok(self
            .store
            .set_contains(&self.keys.workers(), worker_id)
            .await?)
    }

    /// Known workers that currently hold a live status record
    #[instrument(skip(self))]
    pub async fn working(&self) -> Result<BTreeSet<String>, ResqError> {
        let workers: Vec<String> = self.workers().await?.into_iter().collect();
        if workers.is_empty() {
            return Ok(BTreeSet::new());
        }

        let status_keys = workers
            .iter()
            .map(|id| self.keys.worker_status(id))
            .collect();
        let statuses = self.store.get_many(status_keys).await?;

        Ok(workers
            .into_iter()
            .zip(statuses)
            .filter_map(|(id, status)| status.map(|_| id))
            .collect())
    }

    pub async fn worker_state(&self, worker_id: &str) -> Result<WorkerState, ResqError> {
        let live = self
            .store
            .exists(&self.keys.worker_status(worker_id))
            .await?;
        Ok(if live {
            WorkerState::Working
        } else {
            WorkerState::Idle
        })
    }

    /// Start time of a worker; `None` once the started record has expired
    pub async fn worker_started(&self, worker_id: &str) -> Result<Option<DateTime<Utc>>, ResqError> {
        let raw = self
            .store
            .get(&self.keys.worker_started(worker_id))
            .await?;
        match raw {
            None => Ok(None),
            Some(text) => Ok(Some(codec::decode_timestamp(&text)?)),
        }
    }

    /// What a worker is doing right now, if anything
    pub async fn worker_status(&self, worker_id: &str) -> Result<Option<StatusRecord>, ResqError> {
        let raw = self
            .store
            .get(&self.keys.worker_status(worker_id))
            .await?;
        Ok(codec::decode(raw.as_deref())?)
    }
}
