// Redis-backed store with an auto-reconnecting multiplexed connection

use crate::config::RedisConfig;
use crate::errors::StoreError;
use crate::store::{Batch, KeyValueStore, Mutation};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Redis store wrapper.
///
/// The connection manager is a cheap-to-clone multiplexed handle, so one
/// `RedisStore` may be shared by every task of a process.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis and build the connection manager
    #[instrument(skip(config), fields(redis_url = %config.url))]
    pub async fn new(config: &RedisConfig) -> Result<Self, StoreError> {
        info!("Connecting to Redis");

        let client = Client::open(config.url.as_str()).map_err(|e| {
            StoreError::ConnectionFailed(format!("Failed to create Redis client: {}", e))
        })?;

        let connect = ConnectionManager::new(client);
        let manager = tokio::time::timeout(
            Duration::from_secs(config.connect_timeout_seconds),
            connect,
        )
        .await
        .map_err(|_| {
            StoreError::ConnectionFailed(format!(
                "Timed out after {}s connecting to Redis",
                config.connect_timeout_seconds
            ))
        })?
        .map_err(|e| {
            StoreError::ConnectionFailed(format!("Failed to create connection manager: {}", e))
        })?;

        info!("Redis connection established");
        Ok(Self { manager })
    }

    /// Wrap an existing connection manager
    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    /// Get a handle on the shared connection
    pub fn get_connection(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

fn ttl_millis(ttl: Duration) -> i64 {
    // PEXPIRE 0 deletes the key immediately; keep a 1ms floor so a tiny TTL
    // still behaves like an expiry rather than a delete.
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
}

fn to_pipeline(batch: &Batch) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();

    for mutation in batch.iter() {
        match mutation {
            Mutation::Set { key, value } => {
                pipe.set(key, value).ignore();
            }
            Mutation::Expire { key, ttl } => {
                pipe.pexpire(key, ttl_millis(*ttl)).ignore();
            }
            Mutation::Delete { key } => {
                pipe.del(key).ignore();
            }
            Mutation::Incr { key, by } => {
                pipe.incr(key, *by).ignore();
            }
            Mutation::ListPush { key, value } => {
                pipe.rpush(key, value).ignore();
            }
            Mutation::SetAdd { key, member } => {
                pipe.sadd(key, member).ignore();
            }
            Mutation::SetRemove { key, member } => {
                pipe.srem(key, member).ignore();
            }
        }
    }

    pipe
}

#[async_trait]
impl KeyValueStore for RedisStore {
    #[instrument(skip(self, value))]
    async fn list_push(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let mut conn = self.get_connection();
        let len: u64 = conn.rpush(key, value).await?;
        Ok(len)
    }

    #[instrument(skip(self))]
    async fn list_pop(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.get_connection();
        let value: Option<String> = conn.lpop(key, None).await?;
        Ok(value)
    }

    #[instrument(skip(self))]
    async fn list_range(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, StoreError> {
        let mut conn = self.get_connection();
        let values: Vec<String> = conn.lrange(key, start as isize, stop as isize).await?;
        Ok(values)
    }

    #[instrument(skip(self))]
    async fn list_len(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.get_connection();
        let len: u64 = conn.llen(key).await?;
        Ok(len)
    }

    #[instrument(skip(self))]
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.get_connection();
        let added: u64 = conn.sadd(key, member).await?;
        Ok(added > 0)
    }

    #[instrument(skip(self))]
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.get_connection();
        let removed: u64 = conn.srem(key, member).await?;
        Ok(removed > 0)
    }

    #[instrument(skip(self))]
    async fn set_members(&self, key: &str) -> Result<BTreeSet<String>, StoreError> {
        let mut conn = self.get_connection();
        let members: BTreeSet<String> = conn.smembers(key).await?;
        Ok(members)
    }

    #[instrument(skip(self))]
    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.get_connection();
        let present: bool = conn.sismember(key, member).await?;
        Ok(present)
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.get_connection();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    #[instrument(skip(self), fields(key_count = keys.len()))]
    async fn get_many(&self, keys: Vec<String>) -> Result<Vec<Option<String>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        // AsyncCommands::mget sends GET for a single key, whose nil reply does
        // not line up with the input, so always issue MGET.
        let mut conn = self.get_connection();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;
        Ok(values)
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.get_connection();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.get_connection();
        let deleted: u64 = conn.del(key).await?;
        Ok(deleted > 0)
    }

    #[instrument(skip(self))]
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.get_connection();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    #[instrument(skip(self))]
    async fn incr(&self, key: &str, by: i64) -> Result<i64, StoreError> {
        let mut conn = self.get_connection();
        let value: i64 = conn.incr(key, by).await?;
        Ok(value)
    }

    #[instrument(skip(self))]
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.get_connection();
        let applied: bool = conn.pexpire(key, ttl_millis(ttl)).await?;
        Ok(applied)
    }

    #[instrument(skip(self, batch), fields(mutations = batch.len()))]
    async fn execute(&self, batch: Batch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut conn = self.get_connection();
        let pipe = to_pipeline(&batch);
        let _: () = pipe.query_async(&mut conn).await?;

        debug!("Batch committed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.get_connection();

        let response: String = redis::cmd("PING").query_async(&mut conn).await?;
        if response != "PONG" {
            return Err(StoreError::RedisError(format!(
                "Unexpected PING response: {}",
                response
            )));
        }

        Ok(())
    }
}
