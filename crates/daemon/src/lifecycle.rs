// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: configuration, startup, shutdown.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use nlock_adapters::{MemoryKvStore, TracedKvStore};
use nlock_core::{LockConfig, OwnerToken, DEFAULT_TTL};
use nlock_engine::{ClaimError, LockError, LockManager};
use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Store type the daemon runs against (wrapped with tracing)
pub type DaemonStore = TracedKvStore<MemoryKvStore>;

/// Environment variable naming the config file when no argument is given
pub const CONFIG_ENV: &str = "NLOCK_CONFIG";

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bucket (namespace) holding the lock keys
    pub bucket: String,
    /// Keys to claim at startup
    pub keys: Vec<String>,
    /// Lease length
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Owner token; derived from host and pid when unset
    pub owner: Option<String>,
    /// Release and exit after this long instead of waiting for a signal
    #[serde(with = "humantime_serde")]
    pub hold_for: Option<Duration>,
    /// Default log filter when `RUST_LOG` is unset
    pub log: String,
    /// Log file; stderr when unset
    pub log_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bucket: "process_locks".to_string(),
            keys: vec!["lock.1".to_string()],
            ttl: DEFAULT_TTL,
            owner: None,
            hold_for: None,
            log: "info".to_string(),
            log_path: None,
        }
    }
}

impl Config {
    /// Load from the process environment, optionally layered over a TOML file
    pub fn from_env(file: Option<&Path>) -> Result<Self, LifecycleError> {
        let file = file
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        Self::load(file.as_deref(), |var| std::env::var(var).ok())
    }

    /// Defaults, then `file`, then overrides read through `env`
    pub fn load(
        file: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, LifecycleError> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, LifecycleError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| LifecycleError::ConfigRead(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| LifecycleError::ConfigParse(path.to_path_buf(), e))
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), LifecycleError> {
        if let Some(bucket) = env("NLOCK_BUCKET") {
            self.bucket = bucket;
        }
        if let Some(keys) = env("NLOCK_KEYS") {
            self.keys = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(ttl) = env("NLOCK_TTL") {
            self.ttl = parse_duration("NLOCK_TTL", &ttl)?;
        }
        if let Some(owner) = env("NLOCK_OWNER") {
            self.owner = Some(owner);
        }
        if let Some(hold_for) = env("NLOCK_HOLD_FOR") {
            self.hold_for = Some(parse_duration("NLOCK_HOLD_FOR", &hold_for)?);
        }
        if let Some(log) = env("NLOCK_LOG") {
            self.log = log;
        }
        if let Some(log_path) = env("NLOCK_LOG_PATH") {
            self.log_path = Some(PathBuf::from(log_path));
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), LifecycleError> {
        if self.bucket.is_empty() {
            return Err(invalid("NLOCK_BUCKET", "bucket can not be empty"));
        }
        if self.keys.is_empty() {
            return Err(invalid("NLOCK_KEYS", "no keys configured"));
        }
        if self.owner.as_deref() == Some("") {
            return Err(invalid("NLOCK_OWNER", "owner can not be empty"));
        }
        self.lock_config()
            .validate()
            .map_err(|e| invalid("NLOCK_TTL", e))
    }

    pub fn lock_config(&self) -> LockConfig {
        LockConfig::new(self.ttl)
    }

    pub fn owner_token(&self) -> OwnerToken {
        match &self.owner {
            Some(owner) => OwnerToken::new(owner.clone()),
            None => OwnerToken::for_process(),
        }
    }
}

fn parse_duration(var: &str, value: &str) -> Result<Duration, LifecycleError> {
    humantime::parse_duration(value).map_err(|e| invalid(var, e))
}

fn invalid(var: &str, reason: impl ToString) -> LifecycleError {
    LifecycleError::Config {
        var: var.to_string(),
        reason: reason.to_string(),
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Invalid {var}: {reason}")]
    Config { var: String, reason: String },

    #[error("Failed to read config file {0}: {1}")]
    ConfigRead(PathBuf, std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    ConfigParse(PathBuf, toml::de::Error),

    #[error("Could not claim {key}: {source}")]
    Claim { key: String, source: LockError },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Daemon state during operation
pub struct Daemon {
    /// Configuration
    pub config: Config,
    /// Locks held by this process
    pub manager: LockManager<DaemonStore>,
    /// Keys claimed but not yet acquired at startup
    pub pending: Vec<String>,
    /// When daemon started
    pub start_time: Instant,
    reaper: JoinHandle<()>,
}

impl Daemon {
    /// Release every lock; returns the released keys
    pub async fn shutdown(self) -> Vec<String> {
        info!("Shutting down daemon...");
        let released = self.manager.release_all().await;
        self.reaper.abort();
        info!(
            uptime_secs = self.start_time.elapsed().as_secs(),
            "Daemon shutdown complete"
        );
        released
    }
}

/// Start the daemon: build the store and manager, then claim every key
///
/// The store is a fresh in-memory bucket owned by this process.
pub async fn startup(config: &Config) -> Result<Daemon, LifecycleError> {
    // The bucket drops keys nobody renews within one ttl
    let bucket = MemoryKvStore::new(config.bucket.clone()).with_max_age(config.ttl);
    let store = TracedKvStore::new(bucket.clone());

    let owner = config.owner_token();
    info!(bucket = %config.bucket, owner = %owner, ttl = ?config.ttl, "starting");

    let manager = LockManager::new(owner, store)
        .map_err(|e| invalid("NLOCK_OWNER", e))?
        .with_config(config.lock_config());
    let reaper = bucket.spawn_reaper(config.lock_config().heartbeat_interval());

    let mut pending = Vec::new();
    for key in &config.keys {
        match manager.claim(key).await {
            Ok(lock) => info!(key, revision = lock.revision(), "claimed"),
            Err(ClaimError::Pending { source, .. }) => {
                warn!(key, error = %source, "claimed, waiting for acquisition");
                pending.push(key.clone());
            }
            Err(ClaimError::Rejected(source)) => {
                // Clean up what was claimed before the failure
                manager.release_all().await;
                reaper.abort();
                return Err(LifecycleError::Claim {
                    key: key.clone(),
                    source,
                });
            }
        }
    }

    Ok(Daemon {
        config: config.clone(),
        manager,
        pending,
        start_time: Instant::now(),
        reaper,
    })
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
