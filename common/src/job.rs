// Job envelope: a reserved payload bound to its source queue and client

use crate::client::ResqClient;
use crate::errors::ResqError;
use crate::models::{FailureRecord, JobPayload};
use crate::telemetry;
use chrono::Utc;
use serde_json::Value;
use tracing::{info, instrument, warn};

/// A job popped from a queue.
///
/// Lives for one execution attempt. Once reserved the payload exists only
/// here; if the process dies before [`Job::complete`] or [`Job::fail`], the
/// job is gone.
#[derive(Debug, Clone)]
pub struct Job {
    client: ResqClient,
    queue: String,
    payload: JobPayload,
}

impl Job {
    pub(crate) fn new(client: ResqClient, queue: &str, payload: JobPayload) -> Self {
        Self {
            client,
            queue: queue.to_string(),
            payload,
        }
    }

    /// Queue the job was reserved from
    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn payload(&self) -> &JobPayload {
        &self.payload
    }

    pub fn class(&self) -> &str {
        &self.payload.class
    }

    pub fn args(&self) -> &[Value] {
        &self.payload.args
    }

    pub fn client(&self) -> &ResqClient {
        &self.client
    }

    pub fn into_payload(self) -> JobPayload {
        self.payload
    }

    /// Mark `worker_id` as working on this job
    pub async fn start(&self, worker_id: &str) -> Result<(), ResqError> {
        self.client
            .set_worker_status(worker_id, &self.queue, &self.payload)
            .await
    }

    /// Report a successful attempt: count it and mark the worker idle
    #[instrument(skip(self), fields(queue = %self.queue, class = %self.payload.class))]
    pub async fn complete(&self, worker_id: &str) -> Result<(), ResqError> {
        self.client.incr_processed(Some(worker_id)).await?;
        self.client.clear_worker_status(worker_id).await?;

        telemetry::record_processed(&self.queue, &self.payload.class);
        info!("Job completed");
        Ok(())
    }

    /// Report a failed attempt.
    ///
    /// Appends a failure record to the `failed` queue, counts the attempt as
    /// both failed and processed for the worker, and marks the worker idle.
    #[instrument(skip(self, error), fields(queue = %self.queue, class = %self.payload.class))]
    pub async fn fail(&self, worker_id: &str, error: &anyhow::Error) -> Result<(), ResqError> {
        warn!(error = %error, "Job failed");

        let record = FailureRecord {
            failed_at: Utc::now(),
            payload: self.payload.clone(),
            error: error.to_string(),
            backtrace: error.chain().skip(1).map(|cause| cause.to_string()).collect(),
            worker: worker_id.to_string(),
            queue: self.queue.clone(),
        };

        self.client.record_failure(&record).await?;
        self.client.incr_failed(Some(worker_id)).await?;
        self.client.incr_processed(Some(worker_id)).await?;
        self.client.clear_worker_status(worker_id).await?;

        telemetry::record_processed(&self.queue, &self.payload.class);
        telemetry::record_failed(&self.queue, &self.payload.class);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkerState;
    use crate::store::MemoryStore;
    use anyhow::Context;
    use serde_json::json;
    use std::sync::Arc;

    const WORKER: &str = "host:1:mailer";

    async fn reserved_job() -> (ResqClient, Job) {
        let client = ResqClient::new(Arc::new(MemoryStore::new()));
        client
            .enqueue("mailer", "Send", vec![json!("a@b.com")])
            .await
            .unwrap();
        let job = client.reserve("mailer").await.unwrap().unwrap();
        (client, job)
    }

    #[tokio::test]
    async fn test_envelope_accessors() {
        let (_, job) = reserved_job().await;
        assert_eq!(job.queue(), "mailer");
        assert_eq!(job.class(), "Send");
        assert_eq!(job.args(), &[json!("a@b.com")]);
        assert_eq!(job.client().keys().root(), "resque");
        assert_eq!(job.into_payload().class, "Send");
    }

    #[tokio::test]
    async fn test_complete_counts_and_clears_status() {
        let (client, job) = reserved_job().await;
        job.start(WORKER).await.unwrap();
        assert_eq!(client.worker_state(WORKER).await.unwrap(), WorkerState::Working);

        job.complete(WORKER).await.unwrap();

        assert_eq!(client.worker_state(WORKER).await.unwrap(), WorkerState::Idle);
        assert_eq!(client.processed(None).await.unwrap(), 1);
        assert_eq!(client.processed(Some(WORKER)).await.unwrap(), 1);
        assert_eq!(client.failed(Some(WORKER)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fail_records_failure() {
        let (client, job) = reserved_job().await;
        job.start(WORKER).await.unwrap();

        let error = Err::<(), _>(anyhow::anyhow!("smtp timeout"))
            .context("delivery failed")
            .unwrap_err();
        job.fail(WORKER, &error).await.unwrap();

        assert_eq!(client.worker_state(WORKER).await.unwrap(), WorkerState::Idle);
        assert_eq!(client.processed(None).await.unwrap(), 1);
        assert_eq!(client.processed(Some(WORKER)).await.unwrap(), 1);
        assert_eq!(client.failed(Some(WORKER)).await.unwrap(), 1);
        assert_eq!(client.failed(None).await.unwrap(), 1);

        let failures = client.failures(0, 10).await.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error, "delivery failed");
        assert_eq!(failures[0].backtrace, vec!["smtp timeout".to_string()]);
        assert_eq!(failures[0].worker, WORKER);
        assert_eq!(failures[0].queue, "mailer");
        assert_eq!(failures[0].payload.class, "Send");
    }
}
