// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! nlock daemon (nlockd)
//!
//! Claims the configured lock keys, holds them until a signal arrives or the
//! hold period ends, then releases them.
//!
//! The bucket is an in-process `MemoryKvStore`, so nlockd is a single-process
//! host for the lock engine: separate daemons never contend for a key.

use std::path::PathBuf;

use nlockd::{lifecycle, Config, LifecycleError};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let config_path = args.get(1).map(PathBuf::from);

    // Load configuration
    let config = Config::from_env(config_path.as_deref())?;

    // Set up logging
    let _log_guard = setup_logging(&config)?;

    info!(keys = ?config.keys, "Starting nlockd");

    let daemon = match lifecycle::startup(&config).await {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to start daemon: {}", e);
            return Err(e.into());
        }
    };

    // Set up signal handlers
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(pending = ?daemon.pending, "Daemon ready");

    // Signal ready for parent process (e.g., systemd, scripts waiting for startup)
    println!("READY");

    let hold = async {
        match config.hold_for {
            Some(period) => tokio::time::sleep(period).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        _ = sigint.recv() => info!("Received SIGINT, shutting down..."),
        _ = hold => info!("Hold period elapsed, shutting down..."),
    }

    for key in daemon.shutdown().await {
        println!("released {}", key);
    }

    info!("Daemon stopped");
    Ok(())
}

/// Guard that must outlive logging when writing to a file
type LogGuard = Option<tracing_appender::non_blocking::WorkerGuard>;

fn setup_logging(config: &Config) -> Result<LogGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // RUST_LOG wins over the configured default
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log));

    let Some(log_path) = &config.log_path else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
        return Ok(None);
    };

    // Create log directory if needed
    let dir = match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let file_name = log_path
        .file_name()
        .ok_or_else(|| LifecycleError::Config {
            var: "NLOCK_LOG_PATH".to_string(),
            reason: format!("{} has no file name", log_path.display()),
        })?;

    let file_appender = tracing_appender::rolling::never(&dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .init();

    Ok(Some(guard))
}
