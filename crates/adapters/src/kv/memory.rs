// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process key-value bucket

use super::{KvEntry, KvStore, KvWatcher, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Stored {
    value: Vec<u8>,
    revision: u64,
    written_at: Instant,
}

#[derive(Default)]
struct Bucket {
    /// Bucket-wide sequence; every write and delete takes the next value
    sequence: u64,
    entries: HashMap<String, Stored>,
    watchers: HashMap<String, Vec<mpsc::UnboundedSender<KvEntry>>>,
    max_age: Option<Duration>,
}

impl Bucket {
    fn next_revision(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn publish(&mut self, entry: KvEntry) {
        if let Some(watchers) = self.watchers.get_mut(&entry.key) {
            // Closed receivers drop out here
            watchers.retain(|tx| tx.send(entry.clone()).is_ok());
            if watchers.is_empty() {
                self.watchers.remove(&entry.key);
            }
        }
    }

    fn write(&mut self, key: &str, value: &[u8]) -> u64 {
        let revision = self.next_revision();
        self.entries.insert(
            key.to_string(),
            Stored {
                value: value.to_vec(),
                revision,
                written_at: Instant::now(),
            },
        );
        self.publish(KvEntry::put(key, value.to_vec(), revision));
        revision
    }

    fn remove(&mut self, key: &str) -> Option<u64> {
        self.entries.remove(key)?;
        let revision = self.next_revision();
        self.publish(KvEntry::delete(key, revision));
        Some(revision)
    }

    fn purge_expired(&mut self) -> usize {
        let Some(max_age) = self.max_age else {
            return 0;
        };
        let now = Instant::now();
        let mut expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, stored)| now.duration_since(stored.written_at) >= max_age)
            .map(|(key, _)| key.clone())
            .collect();
        expired.sort();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    fn current(&mut self, key: &str) -> Option<&Stored> {
        self.purge_expired();
        self.entries.get(key)
    }
}

/// Key-value bucket kept in process memory
///
/// Cloning shares the bucket. Revisions come from one bucket-wide sequence,
/// so the first write to an empty bucket gets revision 1.
#[derive(Clone)]
pub struct MemoryKvStore {
    name: Arc<str>,
    bucket: Arc<Mutex<Bucket>>,
}

impl MemoryKvStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            bucket: Arc::new(Mutex::new(Bucket::default())),
        }
    }

    /// Expire entries that were not written for `max_age`, like a bucket TTL
    pub fn with_max_age(self, max_age: Duration) -> Self {
        self.bucket().max_age = Some(max_age);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn bucket(&self) -> std::sync::MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current entry for `key`, if present
    pub fn get(&self, key: &str) -> Option<KvEntry> {
        self.bucket()
            .current(key)
            .map(|stored| KvEntry::put(key, stored.value.clone(), stored.revision))
    }

    /// Unconditional write, as another client or an operator would do
    pub fn put(&self, key: &str, value: &[u8]) -> u64 {
        let mut bucket = self.bucket();
        bucket.purge_expired();
        bucket.write(key, value)
    }

    /// Unconditional delete; returns whether the key existed
    pub fn remove(&self, key: &str) -> bool {
        let mut bucket = self.bucket();
        bucket.purge_expired();
        bucket.remove(key).is_some()
    }

    /// Sorted list of live keys
    pub fn keys(&self) -> Vec<String> {
        let mut bucket = self.bucket();
        bucket.purge_expired();
        let mut keys: Vec<String> = bucket.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Drop entries older than the bucket max age; returns how many expired
    pub fn purge_expired(&self) -> usize {
        self.bucket().purge_expired()
    }

    /// Number of open watch subscriptions on `key`
    pub fn watcher_count(&self, key: &str) -> usize {
        let mut bucket = self.bucket();
        if let Some(watchers) = bucket.watchers.get_mut(key) {
            watchers.retain(|tx| !tx.is_closed());
        }
        bucket.watchers.get(key).map_or(0, Vec::len)
    }

    /// Periodically expire entries until every handle to the bucket is dropped
    pub fn spawn_reaper(&self, period: Duration) -> JoinHandle<()> {
        let bucket: Weak<Mutex<Bucket>> = Arc::downgrade(&self.bucket);
        let name = self.name.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(bucket) = bucket.upgrade() else {
                    break;
                };
                let expired = bucket
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .purge_expired();
                if expired > 0 {
                    tracing::debug!(bucket = %name, expired, "expired entries purged");
                }
            }
        })
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn create(&self, key: &str, value: &[u8]) -> Result<u64, StoreError> {
        let mut bucket = self.bucket();
        if let Some(stored) = bucket.current(key) {
            return Err(StoreError::AlreadyExists {
                key: key.to_string(),
                revision: stored.revision,
            });
        }
        Ok(bucket.write(key, value))
    }

    async fn update(&self, key: &str, value: &[u8], expected: u64) -> Result<u64, StoreError> {
        let mut bucket = self.bucket();
        let Some(stored) = bucket.current(key) else {
            return Err(StoreError::NotFound(key.to_string()));
        };
        if stored.revision != expected {
            return Err(StoreError::RevisionMismatch {
                key: key.to_string(),
                expected,
                actual: stored.revision,
            });
        }
        Ok(bucket.write(key, value))
    }

    async fn delete(&self, key: &str, expected: u64) -> Result<(), StoreError> {
        let mut bucket = self.bucket();
        let Some(stored) = bucket.current(key) else {
            return Err(StoreError::NotFound(key.to_string()));
        };
        if stored.revision != expected {
            return Err(StoreError::RevisionMismatch {
                key: key.to_string(),
                expected,
                actual: stored.revision,
            });
        }
        bucket.remove(key);
        Ok(())
    }

    async fn watch(&self, key: &str) -> Result<KvWatcher, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.bucket()
            .watchers
            .entry(key.to_string())
            .or_default()
            .push(tx);
        Ok(KvWatcher::new(key, rx))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
