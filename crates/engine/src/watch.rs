// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Change watch on the lock key

use crate::lock::WeakLock;
use nlock_adapters::KvStore;
use tokio_util::sync::CancellationToken;

/// Follow changes to `key`, re-registering as soon as it is deleted
pub(crate) async fn run<S: KvStore>(
    lock: WeakLock<S>,
    store: S,
    key: String,
    cancel: CancellationToken,
) {
    let subscribed = tokio::select! {
        _ = cancel.cancelled() => return,
        result = store.watch(&key) => result,
    };
    let mut watcher = match subscribed {
        Ok(watcher) => watcher,
        Err(e) => {
            // The heartbeat still renews and retries without the watch
            tracing::error!(error = %e, "error getting watcher");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("stop watching");
                watcher.stop();
                break;
            }
            update = watcher.next() => match update {
                Some(entry) if entry.is_delete() => {
                    let Some(lock) = lock.upgrade() else {
                        break;
                    };
                    lock.on_external_delete(entry.revision).await;
                }
                Some(entry) => {
                    tracing::trace!(revision = entry.revision, "put observed");
                }
                None => {
                    tracing::warn!("watch stream closed");
                    break;
                }
            },
        }
    }
}
