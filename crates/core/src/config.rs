// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Lease length used when none is configured
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Lease configuration shared by every lock a manager creates
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// How long the store keeps a lease alive without renewal
    #[serde(with = "humantime_serde", default = "default_ttl")]
    pub ttl: Duration,
}

fn default_ttl() -> Duration {
    DEFAULT_TTL
}

impl LockConfig {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Renewal period: half the lease, so at least one renewal lands before expiry
    pub fn heartbeat_interval(&self) -> Duration {
        self.ttl / 2
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval().is_zero() {
            return Err(ConfigError::TtlTooShort(self.ttl));
        }
        Ok(())
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

/// Invalid lease configuration
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("ttl {0:?} is too short to derive a heartbeat interval")]
    TtlTooShort(Duration),
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
