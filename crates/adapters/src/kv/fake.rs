// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake key-value store for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{KvStore, KvWatcher, MemoryKvStore, StoreError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvCall {
    Create { key: String, value: String },
    Update { key: String, expected: u64 },
    Delete { key: String, expected: u64 },
    Watch { key: String },
}

#[derive(Default)]
struct Faults {
    create: Option<StoreError>,
    update: Option<StoreError>,
    delete: Option<StoreError>,
    watch: Option<StoreError>,
}

/// In-memory store that records calls and can fail on demand
#[derive(Clone)]
pub struct FakeKvStore {
    inner: MemoryKvStore,
    calls: Arc<Mutex<Vec<KvCall>>>,
    faults: Arc<Mutex<Faults>>,
}

impl Default for FakeKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeKvStore {
    pub fn new() -> Self {
        Self::wrap(MemoryKvStore::new("fake"))
    }

    /// Record calls against an existing bucket (shared with its other clones)
    pub fn wrap(inner: MemoryKvStore) -> Self {
        Self {
            inner,
            calls: Arc::new(Mutex::new(Vec::new())),
            faults: Arc::new(Mutex::new(Faults::default())),
        }
    }

    /// The backing bucket, for out-of-band reads and writes
    pub fn inner(&self) -> &MemoryKvStore {
        &self.inner
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<KvCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Number of recorded calls matching `pred`
    pub fn count(&self, pred: impl Fn(&KvCall) -> bool) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| pred(c))
            .count()
    }

    /// Fail the next create with `err`
    pub fn fail_next_create(&self, err: StoreError) {
        self.faults().create = Some(err);
    }

    /// Fail the next update with `err`
    pub fn fail_next_update(&self, err: StoreError) {
        self.faults().update = Some(err);
    }

    /// Fail the next delete with `err`
    pub fn fail_next_delete(&self, err: StoreError) {
        self.faults().delete = Some(err);
    }

    /// Fail the next watch subscription with `err`
    pub fn fail_watch(&self, err: StoreError) {
        self.faults().watch = Some(err);
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: KvCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

#[async_trait]
impl KvStore for FakeKvStore {
    async fn create(&self, key: &str, value: &[u8]) -> Result<u64, StoreError> {
        self.record(KvCall::Create {
            key: key.to_string(),
            value: String::from_utf8_lossy(value).into_owned(),
        });
        if let Some(err) = self.faults().create.take() {
            return Err(err);
        }
        self.inner.create(key, value).await
    }

    async fn update(&self, key: &str, value: &[u8], expected: u64) -> Result<u64, StoreError> {
        self.record(KvCall::Update {
            key: key.to_string(),
            expected,
        });
        if let Some(err) = self.faults().update.take() {
            return Err(err);
        }
        self.inner.update(key, value, expected).await
    }

    async fn delete(&self, key: &str, expected: u64) -> Result<(), StoreError> {
        self.record(KvCall::Delete {
            key: key.to_string(),
            expected,
        });
        if let Some(err) = self.faults().delete.take() {
            return Err(err);
        }
        self.inner.delete(key, expected).await
    }

    async fn watch(&self, key: &str) -> Result<KvWatcher, StoreError> {
        self.record(KvCall::Watch {
            key: key.to_string(),
        });
        if let Some(err) = self.faults().watch.take() {
            return Err(err);
        }
        self.inner.watch(key).await
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
