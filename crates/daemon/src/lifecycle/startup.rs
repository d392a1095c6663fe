// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and initialization logic.

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use ef_bus::Bus;
use ef_core::{AgentName, AppNetworkConfig, Clock, DomainConfig, EidConfig, SystemClock};
use fs2::FileExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agents::baseos::Zboot;
use crate::agents::downloader::{TransferBackend, TransferRouter};
use crate::agents::{appinst, baseos, downloader, intake, loopback, nim, verifier, AgentDeps};
use crate::config::DaemonConfig;

use super::{Config, DaemonState, LifecycleError, Supervisor};

/// Start the daemon
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    match startup_inner(config).await {
        Ok(state) => Ok(state),
        Err(e) => {
            // Don't clean up if we failed to acquire the lock:
            // those files belong to the already-running daemon.
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(config);
            }
            Err(e)
        }
    }
}

/// Inner startup logic - cleanup_on_failure called if this fails
async fn startup_inner(config: &Config) -> Result<DaemonState, LifecycleError> {
    // 1. Create state directory
    std::fs::create_dir_all(&config.state_dir)?;

    // 2. Acquire lock file FIRST - prevents races
    // Use OpenOptions to avoid truncating the file before we hold the lock,
    // which would wipe the running daemon's PID.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

    // Write PID to lock file (truncate now that we hold the lock)
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file; // Drop mutability

    // 3. Create directories
    let paths = config.paths();
    for dir in [
        paths.persist_dir(),
        paths.run_dir(),
        paths.config_dir(),
        paths.certs_dir(),
        paths.downloads_dir(),
    ] {
        std::fs::create_dir_all(dir)?;
    }

    // 4. Load daemon defaults and reopen persisted publications
    let defaults = DaemonConfig::load(&config.config_path)?;
    let bus = Bus::with_persist_root(paths.persist_dir());
    let zboot = Zboot::open(&bus)?;
    zboot.boot()?;
    if let Some(current) = zboot.current() {
        info!(
            partition = %current.partition_label,
            version = %current.short_version,
            state = ?current.partition_state,
            "booted"
        );
    }

    // 5. Spawn agents
    let deps = AgentDeps::new(bus.clone(), paths.clone(), SystemClock);
    let mut supervisor = Supervisor::new(CancellationToken::new(), crate::env::restart_backoff());
    spawn_agents(&mut supervisor, deps, defaults, Arc::new(TransferRouter::local()));

    info!(agents = supervisor.len(), state_dir = %config.state_dir.display(), "Daemon started");

    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        bus,
        paths,
        supervisor,
        start_time: Instant::now(),
    })
}

/// Start every agent under `supervisor`.
pub(crate) fn spawn_agents<C: Clock>(
    supervisor: &mut Supervisor,
    deps: AgentDeps<C>,
    defaults: DaemonConfig,
    transfer: Arc<dyn TransferBackend>,
) {
    let d = deps.clone();
    supervisor.spawn(AgentName::Zedagent, move |cancel| {
        intake::run(d.clone(), defaults.clone(), cancel)
    });
    let d = deps.clone();
    supervisor.spawn(AgentName::Nim, move |cancel| nim::run(d.clone(), cancel));
    let d = deps.clone();
    supervisor.spawn(AgentName::Downloader, move |cancel| {
        downloader::run(d.clone(), Arc::clone(&transfer), cancel)
    });
    let d = deps.clone();
    supervisor.spawn(AgentName::Verifier, move |cancel| verifier::run(d.clone(), cancel));
    let d = deps.clone();
    supervisor.spawn(AgentName::Zedmanager, move |cancel| appinst::run(d.clone(), cancel));
    let d = deps.clone();
    supervisor.spawn(AgentName::Baseosmgr, move |cancel| baseos::run(d.clone(), cancel));

    let d = deps.clone();
    supervisor.spawn(AgentName::Identitymgr, move |cancel| {
        loopback::run::<EidConfig, C>(d.clone(), AgentName::Zedmanager, cancel)
    });
    let d = deps.clone();
    supervisor.spawn(AgentName::Zedrouter, move |cancel| {
        loopback::run::<AppNetworkConfig, C>(d.clone(), AgentName::Zedmanager, cancel)
    });
    supervisor.spawn(AgentName::Domainmgr, move |cancel| {
        loopback::run::<DomainConfig, C>(deps.clone(), AgentName::Zedmanager, cancel)
    });
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &Config) {
    // Remove PID/lock file
    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
