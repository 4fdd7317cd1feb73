// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease lock runtime
//!
//! A `Lock` is touched by three execution contexts: the caller (register,
//! release), the heartbeat task and the watch task. All mutable fields live
//! behind one mutex that is never held across an await. Store round-trips are
//! serialized by a separate async gate; background work re-checks the state
//! after taking the gate, and every release call takes the gate after the
//! lock enters `Releasing`, so nothing reaches the store once any `release`
//! returns.

use crate::error::LockError;
use crate::observer::{LockObserver, LockSnapshot, NoOpObserver};
use crate::{heartbeat, watch};
use nlock_adapters::KvStore;
use nlock_core::{LockConfig, LockEvent, LockState, OwnerToken, TransitionError};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, Instrument, Span};

/// Control for one background task
struct TaskControl {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TaskControl {
    fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Consumes the control, so each task is signalled at most once
    fn stop(self) {
        self.cancel.cancel();
    }
}

struct LockInner {
    state: LockState,
    /// Last confirmed store revision; 0 means nothing confirmed
    revision: u64,
    heartbeat: Option<TaskControl>,
    watch: Option<TaskControl>,
}

impl LockInner {
    fn apply(&mut self, event: LockEvent) -> Result<LockState, TransitionError> {
        let next = self.state.transition(event)?;
        if next != self.state {
            tracing::debug!(from = %self.state, to = %next, "changing state");
            self.state = next;
        }
        Ok(next)
    }
}

pub(crate) struct Shared<S> {
    name: String,
    owner: OwnerToken,
    config: LockConfig,
    store: S,
    observer: Arc<dyn LockObserver>,
    dispatch: Dispatch,
    span: Span,
    inner: Mutex<LockInner>,
    store_gate: tokio::sync::Mutex<()>,
}

impl<S> Drop for Shared<S> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(|e| e.into_inner());
        for task in [inner.heartbeat.take(), inner.watch.take()].into_iter().flatten() {
            task.stop();
        }
    }
}

/// A named lease lock held through a versioned key-value store
///
/// Cloning yields another handle to the same lock.
pub struct Lock<S: KvStore> {
    shared: Arc<Shared<S>>,
}

impl<S: KvStore> Clone for Lock<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Handle held by background tasks; does not keep the lock alive
pub(crate) struct WeakLock<S>(Weak<Shared<S>>);

impl<S: KvStore> WeakLock<S> {
    pub(crate) fn upgrade(&self) -> Option<Lock<S>> {
        self.0.upgrade().map(|shared| Lock { shared })
    }
}

/// Builder for a standalone `Lock`
pub struct LockBuilder<S> {
    name: String,
    owner: OwnerToken,
    store: S,
    config: LockConfig,
    observer: Arc<dyn LockObserver>,
    dispatch: Option<Dispatch>,
}

impl<S: KvStore> LockBuilder<S> {
    pub fn with_config(mut self, config: LockConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = ttl;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn LockObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Route this lock's logs to `dispatch` instead of the current default
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn build(self) -> Result<Lock<S>, LockError> {
        if self.name.is_empty() {
            return Err(LockError::EmptyKey);
        }
        if self.owner.is_empty() {
            return Err(LockError::EmptyOwner);
        }
        self.config.validate()?;

        let dispatch = self
            .dispatch
            .unwrap_or_else(|| tracing::dispatcher::get_default(|d| d.clone()));
        let span = tracing::dispatcher::with_default(&dispatch, || {
            tracing::info_span!("lock", key = %self.name, owner = %self.owner)
        });
        tracing::dispatcher::with_default(&dispatch, || {
            tracing::debug!(key = %self.name, ttl = ?self.config.ttl, "lock created");
        });

        Ok(Lock {
            shared: Arc::new(Shared {
                name: self.name,
                owner: self.owner,
                config: self.config,
                store: self.store,
                observer: self.observer,
                dispatch,
                span,
                inner: Mutex::new(LockInner {
                    state: LockState::New,
                    revision: 0,
                    heartbeat: None,
                    watch: None,
                }),
                store_gate: tokio::sync::Mutex::new(()),
            }),
        })
    }
}

impl<S: KvStore> Lock<S> {
    pub fn new(
        name: impl Into<String>,
        owner: OwnerToken,
        store: S,
        config: LockConfig,
        observer: Arc<dyn LockObserver>,
        dispatch: Dispatch,
    ) -> Result<Self, LockError> {
        Self::builder(name, owner, store)
            .with_config(config)
            .with_observer(observer)
            .with_dispatch(dispatch)
            .build()
    }

    pub fn builder(name: impl Into<String>, owner: OwnerToken, store: S) -> LockBuilder<S> {
        LockBuilder {
            name: name.into(),
            owner,
            store,
            config: LockConfig::default(),
            observer: Arc::new(NoOpObserver),
            dispatch: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn owner(&self) -> &OwnerToken {
        &self.shared.owner
    }

    pub fn ttl(&self) -> Duration {
        self.shared.config.ttl
    }

    pub fn state(&self) -> LockState {
        self.inner().state
    }

    /// Last confirmed revision, 0 when nothing is confirmed
    pub fn revision(&self) -> u64 {
        self.inner().revision
    }

    /// Registered with a confirmed revision
    pub fn has_acquisition(&self) -> bool {
        let inner = self.inner();
        inner.state == LockState::Registered && inner.revision > 0
    }

    pub fn snapshot(&self) -> LockSnapshot {
        let inner = self.inner();
        self.snapshot_of(&inner)
    }

    pub fn heartbeat_running(&self) -> bool {
        self.inner()
            .heartbeat
            .as_ref()
            .is_some_and(TaskControl::is_running)
    }

    pub fn watch_running(&self) -> bool {
        self.inner()
            .watch
            .as_ref()
            .is_some_and(TaskControl::is_running)
    }

    /// Whether both handles refer to the same lock
    pub fn same_lock(&self, other: &Lock<S>) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Try to create the key; (re)starts the heartbeat whatever the outcome
    ///
    /// Fails fast with `AlreadyRegistering` when another attempt is in flight
    /// and with `Releasing` once release has started.
    pub async fn register(&self) -> Result<u64, LockError> {
        self.scoped(self.register_attempt()).await
    }

    /// Start the change watch; no-op when already running or releasing
    pub fn start_watch(&self) {
        let _default = tracing::dispatcher::set_default(&self.shared.dispatch);
        let _entered = self.shared.span.enter();

        let mut inner = self.inner();
        if inner.state.is_releasing() || inner.watch.as_ref().is_some_and(TaskControl::is_running)
        {
            return;
        }
        let Some(control) = self.spawn_task(|cancel| {
            watch::run(
                self.downgrade(),
                self.shared.store.clone(),
                self.shared.name.clone(),
                cancel,
            )
        }) else {
            return;
        };
        inner.watch = Some(control);
        tracing::debug!("watch started");
    }

    /// Stop background work, drop the key if a revision is confirmed, and
    /// notify `on_release`. Safe to call any number of times, in any state;
    /// a call made while another release is in progress waits for it.
    pub async fn release(&self) {
        self.scoped(self.release_inner()).await
    }

    pub(crate) async fn register_attempt(&self) -> Result<u64, LockError> {
        let result = self.try_register().await;
        self.ensure_heartbeat();
        result
    }

    async fn try_register(&self) -> Result<u64, LockError> {
        let resume = {
            let mut inner = self.inner();
            let from = inner.state;
            match inner.apply(LockEvent::RegisterStarted) {
                Ok(_) => from,
                Err(TransitionError::AlreadyRegistering) => {
                    return Err(LockError::AlreadyRegistering(self.shared.name.clone()));
                }
                Err(_) => return Err(LockError::Releasing(self.shared.name.clone())),
            }
        };
        tracing::debug!(from = %resume, "registering");

        let gate = self.shared.store_gate.lock().await;
        if self.state().is_releasing() {
            return Err(LockError::Releasing(self.shared.name.clone()));
        }

        let result = self
            .shared
            .store
            .create(&self.shared.name, self.shared.owner.as_bytes())
            .await;

        match result {
            Ok(revision) => {
                let acquired = {
                    let mut inner = self.inner();
                    // Recorded even mid-release so the release deletes it
                    inner.revision = revision;
                    match inner.apply(LockEvent::RegisterSucceeded) {
                        Ok(LockState::Registered) => Some(self.snapshot_of(&inner)),
                        _ => None,
                    }
                };
                drop(gate);

                match acquired {
                    Some(snapshot) => {
                        tracing::debug!(revision, "registered");
                        self.shared.observer.on_acquired(&snapshot);
                        Ok(revision)
                    }
                    None => {
                        tracing::debug!(revision, "registration completed during release");
                        Err(LockError::Releasing(self.shared.name.clone()))
                    }
                }
            }
            Err(e) => {
                {
                    let mut inner = self.inner();
                    if let Err(t) = inner.apply(LockEvent::RegisterFailed { resume }) {
                        tracing::debug!(error = %t, "state moved on during registration");
                    }
                }
                drop(gate);
                tracing::warn!(error = %e, "failed to register");
                Err(e.into())
            }
        }
    }

    /// One heartbeat: renew when registered, retry registration when new or lost
    pub(crate) async fn heartbeat_tick(&self) {
        let gate = self.shared.store_gate.lock().await;
        let (state, revision) = {
            let inner = self.inner();
            (inner.state, inner.revision)
        };
        tracing::debug!(%state, revision, "on tick");

        match state {
            LockState::Registered => self.renew(gate, revision).await,
            state if state.needs_registration() => {
                drop(gate);
                // Store failures are already logged by try_register
                if let Err(e) = self.register_attempt().await {
                    tracing::debug!(error = %e, "registration retry did not acquire");
                }
            }
            _ => tracing::debug!(%state, "idle tick"),
        }
    }

    async fn renew(&self, gate: tokio::sync::MutexGuard<'_, ()>, expected: u64) {
        let result = self
            .shared
            .store
            .update(&self.shared.name, self.shared.owner.as_bytes(), expected)
            .await;

        match result {
            Ok(revision) => {
                let mut inner = self.inner();
                // Revisions only move under the gate, so a match means this renewal is current
                if inner.revision == expected {
                    inner.revision = revision;
                }
                tracing::trace!(revision, "renewed");
            }
            Err(e) => {
                tracing::warn!(error = %e, "update error");
                let stale = {
                    let mut inner = self.inner();
                    match inner.apply(LockEvent::RenewFailed) {
                        Ok(_) => Some(std::mem::take(&mut inner.revision)),
                        // Release started meanwhile and owns the cleanup
                        Err(_) => None,
                    }
                };
                let Some(stale) = stale else {
                    return;
                };

                // Conditional on our revision, so another holder's key survives
                if stale != 0 {
                    if let Err(e) = self.shared.store.delete(&self.shared.name, stale).await {
                        tracing::info!(error = %e, "could not delete");
                    }
                }
                drop(gate);

                tracing::debug!("lost key");
                self.shared.observer.on_lost(&self.shared.name);
            }
        }
    }

    /// A delete was observed on the watch stream
    pub(crate) async fn on_external_delete(&self, revision: u64) {
        let state = self.state();
        tracing::debug!(%state, revision, "delete observed");
        if state.is_releasing() {
            return;
        }
        if let Err(e) = self.register_attempt().await {
            tracing::debug!(error = %e, "re-registration did not acquire");
        }
    }

    async fn release_inner(&self) {
        let tasks = {
            let mut inner = self.inner();
            let from = inner.state;
            match inner.apply(LockEvent::ReleaseStarted) {
                Ok(_) => {
                    tracing::debug!(from = %from, "releasing");
                    Some((inner.heartbeat.take(), inner.watch.take()))
                }
                Err(_) => {
                    tracing::debug!(state = %from, "release already requested");
                    None
                }
            }
        };

        if let Some((heartbeat, watch)) = tasks {
            if let Some(task) = heartbeat {
                tracing::debug!("closing refresh");
                task.stop();
            }
            if let Some(task) = watch {
                tracing::debug!("closing watch");
                task.stop();
            }
        }

        // Waits out any store call a background task has in flight. The gate is
        // FIFO, so a later caller queues behind the release that started first.
        let gate = self.shared.store_gate.lock().await;
        let revision = {
            let mut inner = self.inner();
            if inner.state == LockState::Released {
                return;
            }
            // Still releasing here means the first caller was dropped mid-release
            if let Err(e) = inner.apply(LockEvent::ReleaseFinished) {
                tracing::debug!(error = %e, "unexpected state during release");
            }
            std::mem::take(&mut inner.revision)
        };
        if revision != 0 {
            if let Err(e) = self.shared.store.delete(&self.shared.name, revision).await {
                tracing::info!(error = %e, "could not delete");
            }
        }
        drop(gate);

        tracing::debug!("released");
        self.shared.observer.on_release(&self.shared.name);
    }

    fn ensure_heartbeat(&self) {
        let mut inner = self.inner();
        if inner.state.is_releasing()
            || inner
                .heartbeat
                .as_ref()
                .is_some_and(TaskControl::is_running)
        {
            return;
        }
        let period = self.shared.config.heartbeat_interval();
        let Some(control) = self.spawn_task(|cancel| heartbeat::run(self.downgrade(), period, cancel))
        else {
            return;
        };
        inner.heartbeat = Some(control);
        tracing::debug!(interval = ?period, "refresh started");
    }

    fn spawn_task<F, Fut>(&self, task: F) -> Option<TaskControl>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!(error = %e, "no runtime to run background task");
                return None;
            }
        };
        let cancel = CancellationToken::new();
        let handle = runtime.spawn(
            task(cancel.clone())
                .instrument(self.shared.span.clone())
                .with_subscriber(self.shared.dispatch.clone()),
        );
        Some(TaskControl { cancel, handle })
    }

    fn scoped<F: Future>(&self, fut: F) -> impl Future<Output = F::Output> {
        fut.instrument(self.shared.span.clone())
            .with_subscriber(self.shared.dispatch.clone())
    }

    fn snapshot_of(&self, inner: &LockInner) -> LockSnapshot {
        LockSnapshot {
            name: self.shared.name.clone(),
            owner: self.shared.owner.clone(),
            revision: inner.revision,
            state: inner.state,
        }
    }

    pub(crate) fn downgrade(&self) -> WeakLock<S> {
        WeakLock(Arc::downgrade(&self.shared))
    }

    fn inner(&self) -> MutexGuard<'_, LockInner> {
        self.shared.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<S: KvStore> std::fmt::Debug for Lock<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner();
        f.debug_struct("Lock")
            .field("name", &self.shared.name)
            .field("owner", &self.shared.owner)
            .field("state", &inner.state)
            .field("revision", &inner.revision)
            .finish()
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
