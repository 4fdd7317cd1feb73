// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! nlock-core: domain types for the nlock lease-lock client
//!
//! This crate provides:
//! - The pure lock state machine (`LockState::transition`)
//! - Lease configuration
//! - Owner identity

pub mod config;
pub mod owner;
pub mod state;

pub use config::{ConfigError, LockConfig, DEFAULT_TTL};
pub use owner::OwnerToken;
pub use state::{LockEvent, LockState, TransitionError};
