// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Versioned key-value coordination store adapters
//!
//! A lock only needs four capabilities from its backend: create-if-absent,
//! revision-checked update, revision-checked delete, and a live watch on one
//! key. Nothing else (transactions, multi-key atomicity) is assumed.

mod memory;

pub use memory::MemoryKvStore;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeKvStore, KvCall};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from store operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("key already exists: {key} (revision {revision})")]
    AlreadyExists { key: String, revision: u64 },
    #[error("revision mismatch for {key}: expected {expected}, current {actual}")]
    RevisionMismatch {
        key: String,
        expected: u64,
        actual: u64,
    },
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("watch failed: {0}")]
    WatchFailed(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Kind of change recorded for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvOperation {
    Put,
    Delete,
}

/// A single change delivered on a watch stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub revision: u64,
    pub operation: KvOperation,
}

impl KvEntry {
    pub fn put(key: impl Into<String>, value: Vec<u8>, revision: u64) -> Self {
        Self {
            key: key.into(),
            value,
            revision,
            operation: KvOperation::Put,
        }
    }

    pub fn delete(key: impl Into<String>, revision: u64) -> Self {
        Self {
            key: key.into(),
            value: Vec::new(),
            revision,
            operation: KvOperation::Delete,
        }
    }

    pub fn is_delete(&self) -> bool {
        self.operation == KvOperation::Delete
    }
}

/// Live change stream for a single key
///
/// Events arrive in store order. Dropping the watcher unsubscribes.
#[derive(Debug)]
pub struct KvWatcher {
    key: String,
    updates: Option<mpsc::UnboundedReceiver<KvEntry>>,
}

impl KvWatcher {
    pub fn new(key: impl Into<String>, updates: mpsc::UnboundedReceiver<KvEntry>) -> Self {
        Self {
            key: key.into(),
            updates: Some(updates),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Next change, or `None` once the stream is closed or stopped
    pub async fn next(&mut self) -> Option<KvEntry> {
        match self.updates.as_mut() {
            Some(updates) => updates.recv().await,
            None => None,
        }
    }

    /// Unsubscribe; safe to call more than once
    pub fn stop(&mut self) {
        if let Some(mut updates) = self.updates.take() {
            updates.close();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.updates.is_none()
    }
}

/// Adapter for a versioned, watchable key-value namespace
#[async_trait]
pub trait KvStore: Clone + Send + Sync + 'static {
    /// Create `key` only if absent; returns the new revision
    async fn create(&self, key: &str, value: &[u8]) -> Result<u64, StoreError>;

    /// Overwrite `key` only if its current revision equals `expected`
    async fn update(&self, key: &str, value: &[u8], expected: u64) -> Result<u64, StoreError>;

    /// Delete `key` only if its current revision equals `expected`
    async fn delete(&self, key: &str, expected: u64) -> Result<(), StoreError>;

    /// Subscribe to changes of `key`
    async fn watch(&self, key: &str) -> Result<KvWatcher, StoreError>;
}
