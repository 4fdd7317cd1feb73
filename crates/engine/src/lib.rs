// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! nlock lease-lock runtime
//!
//! A `Lock` keeps one key alive in a `KvStore` with a heartbeat and
//! re-acquires it when the key disappears. `LockManager` hands out locks for
//! one owner and tracks them until they are released.

mod error;
mod heartbeat;
mod lock;
mod manager;
mod observer;
mod watch;

#[cfg(test)]
mod testing;

pub use error::{ClaimError, LockError};
pub use lock::{Lock, LockBuilder};
pub use manager::LockManager;
pub use observer::{LockObserver, LockSnapshot, NoOpObserver};
