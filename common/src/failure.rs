// Failed queue: retained records of failed job attempts

use crate::client::ResqClient;
use crate::codec;
use crate::errors::ResqError;
use crate::models::FailureRecord;
use tracing::{info, instrument};

impl ResqClient {
    /// Append a failure record to the failed queue.
    ///
    /// Written straight to the list: the failed queue is not announced in the
    /// queue discovery set.
    #[instrument(skip(self, record), fields(worker = %record.worker, queue = %record.queue))]
    pub async fn record_failure(&self, record: &FailureRecord) -> Result<(), ResqError> {
        let encoded = codec::encode(record)?;
        self.store
            .list_push(&self.keys.failed_queue(), &encoded)
            .await?;
        Ok(())
    }

    /// Read up to `count` failure records starting at `start`, oldest first
    pub async fn failures(&self, start: u64, count: u64) -> Result<Vec<FailureRecord>, ResqError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let stop = start.saturating_add(count - 1);
        let raw = self
            .store
            .list_range(
                &self.keys.failed_queue(),
                i64::try_from(start).unwrap_or(i64::MAX),
                i64::try_from(stop).unwrap_or(i64::MAX),
            )
            .await?;

        let records = raw
            .iter()
            .map(|text| codec::decode_element(text))
            .collect::<Result<Vec<FailureRecord>, _>>()?;
        Ok(records)
    }

    /// Number of retained failure records
    pub async fn failure_count(&self) -> Result<u64, ResqError> {
        Ok(self.store.list_len(&self.keys.failed_queue()).await?)
    }

    /// Move the oldest failure record's job back onto its queue.
    ///
    /// The job is enqueued before the record is removed, so an error leaves
    /// the record in place. Run one requeuer at a time: two concurrent
    /// callers can enqueue the same head record twice.
    #[instrument(skip(self))]
    pub async fn requeue_failure(&self) -> Result<Option<FailureRecord>, ResqError> {
        let Some(record) = self.failures(0, 1).await?.into_iter().next() else {
            return Ok(None);
        };

        self.enqueue(
            &record.queue,
            &record.payload.class,
            record.payload.args.clone(),
        )
        .await?;
        self.store.list_pop(&self.keys.failed_queue()).await?;

        info!(queue = %record.queue, class = %record.payload.class, "Failed job requeued");
        Ok(Some(record))
    }
}
