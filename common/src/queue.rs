// Named FIFO queues: producers push to the tail, workers pop from the head

use crate::client::ResqClient;
use crate::codec;
use crate::errors::ResqError;
use crate::job::Job;
use crate::models::JobPayload;
use crate::store::Batch;
use crate::telemetry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, instrument};

fn validate_queue_name(queue: &str) -> Result<(), ResqError> {
    if queue.trim().is_empty() {
        return Err(ResqError::invalid_name("queue", queue, "must not be empty"));
    }
    Ok(())
}

impl ResqClient {
    /// Append an item to the tail of `queue`.
    ///
    /// The first push from this client to a queue also adds the queue to the
    /// discovery set, in the same atomic batch as the push.
    #[instrument(skip(self, item))]
    pub async fn push<T>(&self, queue: &str, item: &T) -> Result<(), ResqError>
    where
        T: Serialize + ?Sized,
    {
        validate_queue_name(queue)?;
        let encoded = codec::encode(item)?;
        let key = self.keys.queue(queue);

        if self.watched.lock().contains(queue) {
            self.store.list_push(&key, &encoded).await?;
            return Ok(());
        }

        let mut batch = Batch::new();
        batch
            .set_add(self.keys.queues(), queue)
            .list_push(key, encoded);
        self.store.execute(batch).await?;

        self.watched.lock().insert(queue.to_string());
        debug!(queue = %queue, "Queue registered");
        Ok(())
    }

    /// Remove and decode the head of `queue`; `None` when it is empty
    #[instrument(skip(self))]
    pub async fn pop<T>(&self, queue: &str) -> Result<Option<T>, ResqError>
    where
        T: DeserializeOwned,
    {
        let raw = self.store.list_pop(&self.keys.queue(queue)).await?;
        Ok(codec::decode(raw.as_deref())?)
    }

    /// Current number of items in `queue`
    pub async fn size(&self, queue: &str) -> Result<u64, ResqError> {
        Ok(self.store.list_len(&self.keys.queue(queue)).await?)
    }

    /// Read `count` items starting at `start` without removing them.
    ///
    /// Covers the inclusive range `[start, start + count - 1]`; positions past
    /// the tail are simply missing from the result.
    #[instrument(skip(self))]
    pub async fn peek<T>(&self, queue: &str, start: u64, count: u64) -> Result<Vec<T>, ResqError>
    where
        T: DeserializeOwned,
    {
        if count == 0 {
            return Ok(Vec::new());
        }

        let stop = start.saturating_add(count - 1);
        let raw = self
            .store
            .list_range(
                &self.keys.queue(queue),
                clamp_index(start),
                clamp_index(stop),
            )
            .await?;

        let items = raw
            .iter()
            .map(|text| codec::decode_element(text))
            .collect::<Result<Vec<T>, _>>()?;
        Ok(items)
    }

    /// Read the single item at `start`; `None` past the tail
    pub async fn peek_one<T>(&self, queue: &str, start: u64) -> Result<Option<T>, ResqError>
    where
        T: DeserializeOwned,
    {
        Ok(self.peek(queue, start, 1).await?.into_iter().next())
    }

    /// Every queue name ever pushed to
    pub async fn queues(&self) -> Result<BTreeSet<String>, ResqError> {
        Ok(self.store.set_members(&self.keys.queues()).await?)
    }

    /// Push a `{class, args}` job payload onto `queue`
    #[instrument(skip(self, args))]
    pub async fn enqueue(
        &self,
        queue: &str,
        class: &str,
        args: Vec<Value>,
    ) -> Result<(), ResqError> {
        if class.trim().is_empty() {
            return Err(ResqError::invalid_name("job class", class, "must not be empty"));
        }

        self.push(queue, &JobPayload::new(class, args)).await?;
        telemetry::record_enqueued(queue);
        Ok(())
    }

    /// Pop the next job from `queue`.
    ///
    /// `Ok(None)` means the queue was empty, which is the normal outcome of a
    /// poll. A payload that cannot be decoded is an error and is not requeued.
    #[instrument(skip(self))]
    pub async fn reserve(&self, queue: &str) -> Result<Option<Job>, ResqError> {
        let raw = self.store.list_pop(&self.keys.queue(queue)).await?;
        let Some(payload) = codec::decode_payload(raw.as_deref())? else {
            return Ok(None);
        };

        telemetry::record_reserved(queue);
        debug!(queue = %queue, class = %payload.class, "Job reserved");
        Ok(Some(Job::new(self.clone(), queue, payload)))
    }
}

fn clamp_index(index: u64) -> i64 {
    i64::try_from(index).unwrap_or(i64::MAX)
}
