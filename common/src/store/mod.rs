// Key-value store primitives the queue protocol is built on

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use crate::errors::StoreError;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

/// One mutation inside a [`Batch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Set { key: String, value: String },
    Expire { key: String, ttl: Duration },
    Delete { key: String },
    Incr { key: String, by: i64 },
    ListPush { key: String, value: String },
    SetAdd { key: String, member: String },
    SetRemove { key: String, member: String },
}

impl Mutation {
    pub fn key(&self) -> &str {
        match self {
            Mutation::Set { key, .. }
            | Mutation::Expire { key, .. }
            | Mutation::Delete { key }
            | Mutation::Incr { key, .. }
            | Mutation::ListPush { key, .. }
            | Mutation::SetAdd { key, .. }
            | Mutation::SetRemove { key, .. } => key,
        }
    }
}

/// Ordered group of mutations applied all-or-nothing.
///
/// No concurrent reader can observe a subset of a batch. The ephemeral
/// helpers always pair a write with its expiry so a TTL-bounded record can
/// never exist without its TTL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    mutations: Vec<Mutation>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.mutations.push(Mutation::Set {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn expire(&mut self, key: impl Into<String>, ttl: Duration) -> &mut Self {
        self.mutations.push(Mutation::Expire {
            key: key.into(),
            ttl,
        });
        self
    }

    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.mutations.push(Mutation::Delete { key: key.into() });
        self
    }

    pub fn incr(&mut self, key: impl Into<String>, by: i64) -> &mut Self {
        self.mutations.push(Mutation::Incr {
            key: key.into(),
            by,
        });
        self
    }

    pub fn list_push(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.mutations.push(Mutation::ListPush {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn set_add(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.mutations.push(Mutation::SetAdd {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    pub fn set_remove(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.mutations.push(Mutation::SetRemove {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    /// Write a value that disappears on its own after `ttl`.
    pub fn set_ephemeral(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Duration,
    ) -> &mut Self {
        let key = key.into();
        self.set(key.clone(), value).expire(key, ttl)
    }

    /// Increment a counter and push its expiry forward to `ttl` from now.
    pub fn incr_ephemeral(&mut self, key: impl Into<String>, ttl: Duration) -> &mut Self {
        let key = key.into();
        self.incr(key.clone(), 1).expire(key, ttl)
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Mutation> {
        self.mutations.iter()
    }

    pub fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }
}

/// Store handle consumed by the queue client.
///
/// List indices follow Redis `LRANGE` rules: inclusive, negative values count
/// from the tail. Absent keys read as empty lists, empty sets and `None`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Append to the tail of a list, returning the new length
    async fn list_push(&self, key: &str, value: &str) -> Result<u64, StoreError>;

    /// Remove and return the head of a list
    async fn list_pop(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn list_range(&self, key: &str, start: i64, stop: i64)
        -> Result<Vec<String>, StoreError>;

    async fn list_len(&self, key: &str) -> Result<u64, StoreError>;

    /// Returns true when the member was newly added
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Returns true when the member was present
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    async fn set_members(&self, key: &str) -> Result<BTreeSet<String>, StoreError>;

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Fetch many string keys at once; the result lines up with `keys`
    async fn get_many(&self, keys: Vec<String>) -> Result<Vec<Option<String>>, StoreError>;

    /// Overwrite a string value, clearing any expiry
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Returns true when the key existed
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Increment an integer counter, creating it at zero, keeping any expiry
    async fn incr(&self, key: &str, by: i64) -> Result<i64, StoreError>;

    /// Returns false when the key does not exist
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Apply every mutation of the batch atomically
    async fn execute(&self, batch: Batch) -> Result<(), StoreError>;

    /// Round-trip health check
    async fn ping(&self) -> Result<(), StoreError>;
}
