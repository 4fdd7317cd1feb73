// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for engine tests

use crate::observer::{LockObserver, LockSnapshot};
use async_trait::async_trait;
use nlock_adapters::{FakeKvStore, KvStore, KvWatcher, StoreError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    Acquired { key: String, revision: u64 },
    Lost { key: String },
    Released { key: String },
}

/// Observer that records every callback
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn acquired(&self) -> usize {
        self.count(|e| matches!(e, ObservedEvent::Acquired { .. }))
    }

    pub fn lost(&self) -> usize {
        self.count(|e| matches!(e, ObservedEvent::Lost { .. }))
    }

    pub fn released(&self) -> usize {
        self.count(|e| matches!(e, ObservedEvent::Released { .. }))
    }

    fn count(&self, pred: impl Fn(&ObservedEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    fn push(&self, event: ObservedEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl LockObserver for RecordingObserver {
    fn on_acquired(&self, lock: &LockSnapshot) {
        self.push(ObservedEvent::Acquired {
            key: lock.name.clone(),
            revision: lock.revision,
        });
    }

    fn on_lost(&self, key: &str) {
        self.push(ObservedEvent::Lost {
            key: key.to_string(),
        });
    }

    fn on_release(&self, key: &str) {
        self.push(ObservedEvent::Released {
            key: key.to_string(),
        });
    }
}

/// Poll `cond` until it holds, letting background tasks run in between
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Held {
    Create,
    Update,
}

/// Store whose creates or updates wait until `open` is called
#[derive(Clone)]
pub struct SlowStore {
    pub inner: FakeKvStore,
    pub started: Arc<Notify>,
    gate: Arc<Notify>,
    held: Held,
}

impl SlowStore {
    pub fn creates() -> Self {
        Self::holding(Held::Create)
    }

    pub fn updates() -> Self {
        Self::holding(Held::Update)
    }

    fn holding(held: Held) -> Self {
        Self {
            inner: FakeKvStore::new(),
            started: Arc::new(Notify::new()),
            gate: Arc::new(Notify::new()),
            held,
        }
    }

    /// Let the pending call through
    pub fn open(&self) {
        self.gate.notify_one();
    }

    async fn hold(&self, op: Held) {
        if self.held == op {
            self.started.notify_one();
            self.gate.notified().await;
        }
    }
}

#[async_trait]
impl KvStore for SlowStore {
    async fn create(&self, key: &str, value: &[u8]) -> Result<u64, StoreError> {
        self.hold(Held::Create).await;
        self.inner.create(key, value).await
    }

    async fn update(&self, key: &str, value: &[u8], expected: u64) -> Result<u64, StoreError> {
        self.hold(Held::Update).await;
        self.inner.update(key, value, expected).await
    }

    async fn delete(&self, key: &str, expected: u64) -> Result<(), StoreError> {
        self.inner.delete(key, expected).await
    }

    async fn watch(&self, key: &str) -> Result<KvWatcher, StoreError> {
        self.inner.watch(key).await
    }
}

/// A writer that captures log output for testing
#[derive(Clone, Default)]
pub struct CapturedLogs {
    logs: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    pub fn contents(&self) -> String {
        let logs = self.logs.lock().unwrap();
        String::from_utf8_lossy(&logs).to_string()
    }

    pub fn dispatch(&self) -> tracing::Dispatch {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_writer(self.clone())
            .with_ansi(false)
            .without_time()
            .finish();
        tracing::Dispatch::new(subscriber)
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.logs.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
