// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle callbacks for locks

use nlock_core::{LockState, OwnerToken};

/// Read-only view of a lock at the moment of a callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSnapshot {
    pub name: String,
    pub owner: OwnerToken,
    pub revision: u64,
    pub state: LockState,
}

/// Receives lock lifecycle transitions
///
/// Each callback fires once per corresponding transition, with no internal
/// lock held and no store call in flight, so implementations may call the
/// lock's synchronous accessors directly. Callbacks are synchronous; async
/// operations such as `release` must be spawned onto the runtime rather than
/// awaited.
pub trait LockObserver: Send + Sync {
    /// Registration succeeded
    fn on_acquired(&self, _lock: &LockSnapshot) {}

    /// A renewal was rejected and the lease is gone
    fn on_lost(&self, _key: &str) {}

    /// Release completed; the lock is inert
    fn on_release(&self, _key: &str) {}
}

/// Observer that ignores every callback
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl LockObserver for NoOpObserver {}
