// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrapper for consistent observability

use crate::kv::{KvStore, KvWatcher, StoreError};
use async_trait::async_trait;
use tracing::Instrument;

/// Wrapper that adds tracing to any KvStore
#[derive(Clone)]
pub struct TracedKvStore<S> {
    inner: S,
}

impl<S> TracedKvStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: KvStore> KvStore for TracedKvStore<S> {
    async fn create(&self, key: &str, value: &[u8]) -> Result<u64, StoreError> {
        let span = tracing::info_span!("kv.create", key);
        async {
            tracing::debug!(value_len = value.len(), "starting");

            let start = std::time::Instant::now();
            let result = self.inner.create(key, value).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(revision) => tracing::debug!(
                    revision,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "created"
                ),
                // Someone else holding the key is the common case, not a fault
                Err(e @ StoreError::AlreadyExists { .. }) => tracing::debug!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "create rejected"
                ),
                Err(e) => tracing::error!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "create failed"
                ),
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn update(&self, key: &str, value: &[u8], expected: u64) -> Result<u64, StoreError> {
        let span = tracing::info_span!("kv.update", key, expected);
        async {
            let start = std::time::Instant::now();
            let result = self.inner.update(key, value, expected).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(revision) => tracing::debug!(
                    revision,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "updated"
                ),
                Err(e) => tracing::warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "update rejected"
                ),
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn delete(&self, key: &str, expected: u64) -> Result<(), StoreError> {
        let span = tracing::info_span!("kv.delete", key, expected);
        async {
            let result = self.inner.delete(key, expected).await;
            // delete() failing is often acceptable (key already expired or taken over)
            match &result {
                Ok(()) => tracing::debug!("deleted"),
                Err(e) => tracing::debug!(error = %e, "delete skipped"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn watch(&self, key: &str) -> Result<KvWatcher, StoreError> {
        let span = tracing::info_span!("kv.watch", key);
        async {
            let result = self.inner.watch(key).await;
            match &result {
                Ok(_) => tracing::debug!("subscribed"),
                Err(e) => tracing::error!(error = %e, "subscribe failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
