// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock state machine for lease-based exclusive access
//!
//! Pure transition function; the engine drives it from the caller, the
//! heartbeat task and the watch task, always under the lock's own mutex.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a single named lock
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockState {
    /// Created, no confirmed registration yet
    New,
    /// A create-if-absent call is in flight
    Registering,
    /// Key is held with a confirmed revision
    Registered,
    /// Lease was lost; the heartbeat keeps retrying registration
    Lost,
    /// Release requested, background work is being torn down
    Releasing,
    /// Terminal
    Released,
}

impl LockState {
    /// True once a release has started (`Releasing` or `Released`)
    pub fn is_releasing(&self) -> bool {
        matches!(self, LockState::Releasing | LockState::Released)
    }

    /// True only for `Released`
    pub fn is_terminal(&self) -> bool {
        matches!(self, LockState::Released)
    }

    /// States the heartbeat answers with a fresh registration attempt
    pub fn needs_registration(&self) -> bool {
        matches!(self, LockState::New | LockState::Lost)
    }

    /// Pure state transition function
    pub fn transition(self, event: LockEvent) -> Result<LockState, TransitionError> {
        use LockState::*;

        match (self, event) {
            (New | Lost | Registered, LockEvent::RegisterStarted) => Ok(Registering),
            (Registering, LockEvent::RegisterStarted) => Err(TransitionError::AlreadyRegistering),

            (Registering, LockEvent::RegisterSucceeded) => Ok(Registered),
            (Registering, LockEvent::RegisterFailed { resume }) => match resume {
                // Resuming into a transient state would wedge the machine
                Registering | Releasing | Released => Err(TransitionError::Invalid {
                    from: self,
                    event: LockEvent::RegisterFailed { resume },
                }),
                New | Registered | Lost => Ok(resume),
            },
            // A registration that finishes mid-release is cleaned up by the release
            (Releasing, LockEvent::RegisterSucceeded | LockEvent::RegisterFailed { .. }) => {
                Ok(Releasing)
            }

            (Registered, LockEvent::RenewFailed) => Ok(Lost),

            (Releasing | Released, LockEvent::RegisterStarted | LockEvent::ReleaseStarted) => {
                Err(TransitionError::Releasing(self))
            }
            (New | Registering | Registered | Lost, LockEvent::ReleaseStarted) => Ok(Releasing),

            (Releasing, LockEvent::ReleaseFinished) => Ok(Released),

            (
                New | Registered | Lost | Released,
                LockEvent::RegisterSucceeded | LockEvent::RegisterFailed { .. },
            )
            | (New | Registering | Lost | Releasing | Released, LockEvent::RenewFailed)
            | (New | Registering | Registered | Lost | Released, LockEvent::ReleaseFinished) => {
                Err(TransitionError::Invalid { from: self, event })
            }
        }
    }
}

impl std::fmt::Display for LockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LockState::New => "new",
            LockState::Registering => "registering",
            LockState::Registered => "registered",
            LockState::Lost => "lost",
            LockState::Releasing => "releasing",
            LockState::Released => "released",
        };
        f.write_str(name)
    }
}

/// Inputs that drive lock transitions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockEvent {
    /// A create-if-absent attempt is about to be issued
    RegisterStarted,
    /// The store accepted the create
    RegisterSucceeded,
    /// The store rejected the create; return to the state held before the attempt
    RegisterFailed { resume: LockState },
    /// A revision-checked renewal was rejected
    RenewFailed,
    /// The caller asked for release
    ReleaseStarted,
    /// Background work is stopped and the key cleanup is done
    ReleaseFinished,
}

/// Rejected transitions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("registration already in flight")]
    AlreadyRegistering,
    #[error("lock is {0}")]
    Releasing(LockState),
    #[error("invalid transition from {from} on {event:?}")]
    Invalid { from: LockState, event: LockEvent },
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
