// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, supervision, shutdown.

mod startup;
mod supervisor;
pub use startup::startup;
pub use supervisor::Supervisor;

use std::fs::File;
use std::path::PathBuf;
use std::time::Instant;

use ef_bus::{Bus, BusError};
use ef_core::Paths;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ConfigError;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/ef)
    pub state_dir: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Path to `efd.toml`
    pub config_path: PathBuf,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Uses fixed paths under `~/.local/state/ef/` (or `$XDG_STATE_HOME/ef/`).
    pub fn load() -> Result<Self, LifecycleError> {
        Ok(Self::for_dir(crate::env::state_dir()?))
    }

    pub fn for_dir(state_dir: impl Into<PathBuf>) -> Self {
        let paths = Paths::new(state_dir);
        Self {
            lock_path: paths.lock_path(),
            log_path: paths.log_path(),
            config_path: paths.config_file(),
            state_dir: paths.root().to_path_buf(),
        }
    }

    pub fn paths(&self) -> Paths {
        Paths::new(&self.state_dir)
    }
}

/// Daemon state during operation.
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub bus: Bus,
    pub paths: Paths,
    pub supervisor: Supervisor,
    pub start_time: Instant,
}

impl DaemonState {
    /// Stop every agent and release the PID file.
    ///
    /// Persistent publications are already on disk; there is nothing to
    /// flush.
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!(uptime_secs = self.start_time.elapsed().as_secs(), "shutting down daemon");

        if !self.supervisor.shutdown(crate::env::drain_timeout()).await {
            warn!("some agents did not stop in time");
        }

        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!("Failed to remove PID file: {}", e);
            }
        }

        // Lock file is released when self.lock_file is dropped
        info!("Daemon shutdown complete");
        Ok(())
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
