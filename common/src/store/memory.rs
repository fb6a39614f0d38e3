// In-process store mirroring the Redis semantics the queue protocol relies on

use crate::errors::StoreError;
use crate::store::{Batch, KeyValueStore, Mutation};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    List(VecDeque<String>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

impl Keyspace {
    /// Live entry for `key`, dropping it first if its TTL has passed.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn list_mut(
        &mut self,
        key: &str,
        create: bool,
    ) -> Result<Option<&mut VecDeque<String>>, StoreError> {
        if self.live(key).is_none() {
            if !create {
                return Ok(None);
            }
            self.entries
                .insert(key.to_string(), Entry::new(Value::List(VecDeque::new())));
        }

        match self.entries.get_mut(key).map(|e| &mut e.value) {
            Some(Value::List(list)) => Ok(Some(list)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    fn set_mut(
        &mut self,
        key: &str,
        create: bool,
    ) -> Result<Option<&mut BTreeSet<String>>, StoreError> {
        if self.live(key).is_none() {
            if !create {
                return Ok(None);
            }
            self.entries
                .insert(key.to_string(), Entry::new(Value::Set(BTreeSet::new())));
        }

        match self.entries.get_mut(key).map(|e| &mut e.value) {
            Some(Value::Set(set)) => Ok(Some(set)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        match self.live(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn list_push(&mut self, key: &str, value: &str) -> Result<u64, StoreError> {
        let list = self
            .list_mut(key, true)?
            .ok_or_else(|| StoreError::WrongType(key.to_string()))?;
        list.push_back(value.to_string());
        Ok(list.len() as u64)
    }

    fn list_pop(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        let (value, now_empty) = match self.list_mut(key, false)? {
            None => return Ok(None),
            Some(list) => (list.pop_front(), list.is_empty()),
        };
        if now_empty {
            self.entries.remove(key);
        }
        Ok(value)
    }

    fn list_range(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        let Some(list) = self.list_mut(key, false)? else {
            return Ok(Vec::new());
        };

        let len = list.len() as i64;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return Ok(Vec::new());
        }

        Ok(list
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect())
    }

    fn set_add(&mut self, key: &str, member: &str) -> Result<bool, StoreError> {
        let set = self
            .set_mut(key, true)?
            .ok_or_else(|| StoreError::WrongType(key.to_string()))?;
        Ok(set.insert(member.to_string()))
    }

    fn set_remove(&mut self, key: &str, member: &str) -> Result<bool, StoreError> {
        let (removed, now_empty) = match self.set_mut(key, false)? {
            None => return Ok(false),
            Some(set) => (set.remove(member), set.is_empty()),
        };
        if now_empty {
            self.entries.remove(key);
        }
        Ok(removed)
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries
            .insert(key.to_string(), Entry::new(Value::Str(value.to_string())));
    }

    fn delete(&mut self, key: &str) -> bool {
        self.live(key).is_some() && self.entries.remove(key).is_some()
    }

    fn incr(&mut self, key: &str, by: i64) -> Result<i64, StoreError> {
        match self.live(key) {
            None => {
                self.set(key, &by.to_string());
                Ok(by)
            }
            Some(entry) => {
                let Value::Str(current) = &entry.value else {
                    return Err(StoreError::WrongType(key.to_string()));
                };
                let current: i64 = current
                    .parse()
                    .map_err(|_| StoreError::NotAnInteger(key.to_string()))?;
                let next = current
                    .checked_add(by)
                    .ok_or_else(|| StoreError::NotAnInteger(key.to_string()))?;
                entry.value = Value::Str(next.to_string());
                Ok(next)
            }
        }
    }

    fn expire(&mut self, key: &str, ttl: Duration) -> bool {
        match self.live(key) {
            None => false,
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
        }
    }

    fn apply(&mut self, mutation: Mutation) -> Result<(), StoreError> {
        match mutation {
            Mutation::Set { key, value } => self.set(&key, &value),
            Mutation::Expire { key, ttl } => {
                self.expire(&key, ttl);
            }
            Mutation::Delete { key } => {
                self.delete(&key);
            }
            Mutation::Incr { key, by } => {
                self.incr(&key, by)?;
            }
            Mutation::ListPush { key, value } => {
                self.list_push(&key, &value)?;
            }
            Mutation::SetAdd { key, member } => {
                self.set_add(&key, &member)?;
            }
            Mutation::SetRemove { key, member } => {
                self.set_remove(&key, &member)?;
            }
        }
        Ok(())
    }
}

/// In-memory [`KeyValueStore`] for tests and single-process embedding.
///
/// Expiry is lazy: an expired key is dropped the next time it is touched.
/// Clones share the same keyspace.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    keyspace: Arc<Mutex<Keyspace>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let mut keyspace = self.keyspace.lock();
        keyspace.entries.retain(|_, e| !e.is_expired(now));
        keyspace.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining lifetime of a key, `None` when absent or persistent
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let mut keyspace = self.keyspace.lock();
        let expires_at = keyspace.live(key)?.expires_at?;
        Some(expires_at.saturating_duration_since(Instant::now()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn list_push(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        self.keyspace.lock().list_push(key, value)
    }

    async fn list_pop(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.keyspace.lock().list_pop(key)
    }

    async fn list_range(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, StoreError> {
        self.keyspace.lock().list_range(key, start, stop)
    }

    async fn list_len(&self, key: &str) -> Result<u64, StoreError> {
        let mut keyspace = self.keyspace.lock();
        Ok(keyspace.list_mut(key, false)?.map_or(0, |l| l.len() as u64))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.keyspace.lock().set_add(key, member)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.keyspace.lock().set_remove(key, member)
    }

    async fn set_members(&self, key: &str) -> Result<BTreeSet<String>, StoreError> {
        let mut keyspace = self.keyspace.lock();
        Ok(keyspace.set_mut(key, false)?.cloned().unwrap_or_default())
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut keyspace = self.keyspace.lock();
        Ok(keyspace
            .set_mut(key, false)?
            .is_some_and(|s| s.contains(member)))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.keyspace.lock().get(key)
    }

    async fn get_many(&self, keys: Vec<String>) -> Result<Vec<Option<String>>, StoreError> {
        let mut keyspace = self.keyspace.lock();
        // MGET reports non-string values as nil rather than failing.
        Ok(keys
            .iter()
            .map(|key| keyspace.get(key).ok().flatten())
            .collect())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.keyspace.lock().set(key, value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.keyspace.lock().delete(key))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.keyspace.lock().live(key).is_some())
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64, StoreError> {
        self.keyspace.lock().incr(key, by)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        Ok(self.keyspace.lock().expire(key, ttl))
    }

    async fn execute(&self, batch: Batch) -> Result<(), StoreError> {
        let mut keyspace = self.keyspace.lock();

        // Only the keys a batch names can change; saving those is enough to
        // undo a partial application.
        let mut saved: Vec<(String, Option<Entry>)> = Vec::new();
        for mutation in batch.iter() {
            let key = mutation.key();
            if !saved.iter().any(|(k, _)| k == key) {
                saved.push((key.to_string(), keyspace.entries.get(key).cloned()));
            }
        }

        for mutation in batch.into_mutations() {
            if let Err(err) = keyspace.apply(mutation) {
                for (key, entry) in saved {
                    match entry {
                        Some(entry) => keyspace.entries.insert(key, entry),
                        None => keyspace.entries.remove(&key),
                    };
                }
                return Err(err);
            }
        }

        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
