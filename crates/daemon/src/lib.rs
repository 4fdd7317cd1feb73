// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! nlockd: claims lease locks at startup and holds them until shutdown

pub mod lifecycle;

pub use lifecycle::{startup, Config, Daemon, DaemonStore, LifecycleError};
