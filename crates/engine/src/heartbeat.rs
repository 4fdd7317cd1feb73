// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic lease renewal

use crate::lock::WeakLock;
use nlock_adapters::KvStore;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Tick every `period` until cancelled or the lock is dropped
///
/// The first tick fires one period after start; registration has just been
/// attempted by whoever spawned the task.
pub(crate) async fn run<S: KvStore>(lock: WeakLock<S>, period: Duration, cancel: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("refresh stopped");
                break;
            }
            _ = ticker.tick() => {
                let Some(lock) = lock.upgrade() else {
                    tracing::debug!("lock dropped, stopping refresh");
                    break;
                };
                lock.heartbeat_tick().await;
            }
        }
    }
}
