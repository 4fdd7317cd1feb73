// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of locks held by one owner
//!
//! The manager hands out at most one `Lock` per key. Entries leave the
//! registry when their lock finishes releasing, whoever triggered it.

use crate::error::{ClaimError, LockError};
use crate::lock::{Lock, WeakLock};
use crate::observer::{LockObserver, LockSnapshot, NoOpObserver};
use nlock_adapters::KvStore;
use nlock_core::{LockConfig, OwnerToken};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use std::time::Duration;
use tracing::Dispatch;

type Registry<S> = Arc<Mutex<HashMap<String, Lock<S>>>>;

pub struct LockManager<S: KvStore> {
    owner: OwnerToken,
    store: S,
    config: LockConfig,
    observer: Arc<dyn LockObserver>,
    dispatch: Option<Dispatch>,
    locks: Registry<S>,
}

impl<S: KvStore> LockManager<S> {
    pub fn new(owner: OwnerToken, store: S) -> Result<Self, LockError> {
        if owner.is_empty() {
            return Err(LockError::EmptyOwner);
        }
        Ok(Self {
            owner,
            store,
            config: LockConfig::default(),
            observer: Arc::new(NoOpObserver),
            dispatch: None,
            locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn with_config(mut self, config: LockConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = ttl;
        self
    }

    /// Forward lifecycle callbacks of every claimed lock to `observer`
    pub fn with_observer(mut self, observer: Arc<dyn LockObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn owner(&self) -> &OwnerToken {
        &self.owner
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Create a lock for `key`, register it and start its watch
    ///
    /// `Rejected` means no lock remains: either none was built, or a release
    /// overtook the registration and already removed it from the registry.
    /// `Pending` means the lock is in the registry and its heartbeat keeps
    /// retrying registration.
    pub async fn claim(&self, key: &str) -> Result<Lock<S>, ClaimError<S>> {
        let lock = {
            let mut locks = self.locks();
            if locks.contains_key(key) {
                return Err(LockError::AlreadyClaimedLocally(key.to_string()).into());
            }

            let observer = Arc::new(ManagerObserver {
                locks: Arc::downgrade(&self.locks),
                lock: OnceLock::new(),
                forward: Arc::clone(&self.observer),
            });
            let mut builder = Lock::builder(key, self.owner.clone(), self.store.clone())
                .with_config(self.config.clone())
                .with_observer(observer.clone());
            if let Some(dispatch) = &self.dispatch {
                builder = builder.with_dispatch(dispatch.clone());
            }
            let lock = builder.build()?;
            let _ = observer.lock.set(lock.downgrade());
            locks.insert(key.to_string(), lock.clone());
            lock
        };

        let registered = lock.register().await;
        lock.start_watch();

        match registered {
            Ok(_) => Ok(lock),
            Err(source @ LockError::Releasing(_)) => {
                tracing::debug!(key, "claim overtaken by release");
                Err(ClaimError::Rejected(source))
            }
            Err(source) => {
                tracing::warn!(key, error = %source, "lock claimed but not acquired yet");
                Err(ClaimError::Pending { lock, source })
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<Lock<S>> {
        self.locks().get(key).cloned()
    }

    /// Keys currently in the registry, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.locks().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.locks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks().is_empty()
    }

    /// Release every lock in the registry; returns their keys, sorted
    pub async fn release_all(&self) -> Vec<String> {
        let mut locks: Vec<Lock<S>> = self.locks().values().cloned().collect();
        locks.sort_by(|a, b| a.name().cmp(b.name()));

        let mut released = Vec::with_capacity(locks.len());
        for lock in locks {
            lock.release().await;
            released.push(lock.name().to_string());
        }
        released
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<String, Lock<S>>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Keeps the registry in step with lock lifecycles
struct ManagerObserver<S: KvStore> {
    locks: Weak<Mutex<HashMap<String, Lock<S>>>>,
    /// The lock this observer was built for
    lock: OnceLock<WeakLock<S>>,
    forward: Arc<dyn LockObserver>,
}

impl<S: KvStore> LockObserver for ManagerObserver<S> {
    fn on_acquired(&self, lock: &LockSnapshot) {
        tracing::info!(key = %lock.name, revision = lock.revision, "lock acquired");
        self.forward.on_acquired(lock);
    }

    fn on_lost(&self, key: &str) {
        tracing::info!(key, "lock lost");
        self.forward.on_lost(key);
    }

    fn on_release(&self, key: &str) {
        let released = self.lock.get().and_then(WeakLock::upgrade);
        if let (Some(locks), Some(released)) = (self.locks.upgrade(), released) {
            let mut locks = locks.lock().unwrap_or_else(|e| e.into_inner());
            // A re-claim under the same key is a different instance and stays
            if locks.get(key).is_some_and(|lock| lock.same_lock(&released)) {
                locks.remove(key);
            }
        }
        tracing::info!(key, "lock released");
        self.forward.on_release(key);
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
