// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for locks and the lock manager

use crate::lock::Lock;
use nlock_adapters::{KvStore, StoreError};
use nlock_core::ConfigError;
use thiserror::Error;

/// Errors from lock construction, registration and local coordination
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("key can not be empty")]
    EmptyKey,
    #[error("owner can not be empty")]
    EmptyOwner,
    #[error("lock already claimed by this manager: {0}")]
    AlreadyClaimedLocally(String),
    #[error("already registering: {0}")]
    AlreadyRegistering(String),
    #[error("lock is being released: {0}")]
    Releasing(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a claim that did not end with a registered lock
#[derive(Error)]
pub enum ClaimError<S: KvStore> {
    /// No lock remains, either because none was built or because a release
    /// finished it before registration completed
    #[error(transparent)]
    Rejected(#[from] LockError),
    /// The lock exists locally and its heartbeat keeps retrying registration
    #[error("lock claimed but not yet acquired: {source}")]
    Pending { lock: Lock<S>, source: LockError },
}

impl<S: KvStore> ClaimError<S> {
    /// The underlying lock error
    pub fn error(&self) -> &LockError {
        match self {
            ClaimError::Rejected(e) => e,
            ClaimError::Pending { source, .. } => source,
        }
    }

    /// The pending lock, if one was created
    pub fn lock(&self) -> Option<&Lock<S>> {
        match self {
            ClaimError::Rejected(_) => None,
            ClaimError::Pending { lock, .. } => Some(lock),
        }
    }

    pub fn into_lock(self) -> Option<Lock<S>> {
        match self {
            ClaimError::Rejected(_) => None,
            ClaimError::Pending { lock, .. } => Some(lock),
        }
    }
}

impl<S: KvStore> std::fmt::Debug for ClaimError<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimError::Rejected(e) => f.debug_tuple("Rejected").field(e).finish(),
            ClaimError::Pending { lock, source } => f
                .debug_struct("Pending")
                .field("lock", lock)
                .field("source", source)
                .finish(),
        }
    }
}
