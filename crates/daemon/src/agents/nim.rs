// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Network status: publishes the management ports listed in `efd.toml`.

use ef_bus::{BusError, Publication};
use ef_core::{AgentName, Clock, DeviceNetworkStatus, NetworkPortStatus, GLOBAL_KEY};
use tokio_util::sync::CancellationToken;

use crate::agents::AgentDeps;
use crate::config::DaemonConfig;
use crate::error::AgentError;

const AGENT: AgentName = AgentName::Nim;

fn publish_ports(
    publication: &Publication<DeviceNetworkStatus>,
    ports: &[NetworkPortStatus],
) -> Result<(), BusError> {
    let status = DeviceNetworkStatus { testing: false, ports: ports.to_vec() };
    if publication.get(GLOBAL_KEY).as_ref() != Some(&status) {
        tracing::info!(
            ports = status.ports.len(),
            usable = status.count_local_addr_any_no_link_local(),
            "device network status"
        );
    }
    publication.publish(GLOBAL_KEY, &status)
}

/// Publish the configured ports and follow edits to `efd.toml` until
/// cancelled. An unreadable file keeps the last good ports.
pub async fn run<C: Clock>(
    deps: AgentDeps<C>,
    cancel: CancellationToken,
) -> Result<(), AgentError> {
    let heartbeat = deps.heartbeat(AGENT);
    let publication: Publication<DeviceNetworkStatus> = deps.bus.publication(AGENT, None)?;
    let path = deps.paths.config_file();

    publication.clear_restarted();
    let mut ports = match DaemonConfig::load(&path) {
        Ok(config) => config.ports,
        Err(e) => {
            tracing::warn!(error = %e, "no usable network config");
            Vec::new()
        }
    };
    publish_ports(&publication, &ports)?;
    publication.signal_restarted();

    let mut ticker = heartbeat.ticker();
    let mut poll = tokio::time::interval(crate::env::intake_poll_interval());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = poll.tick() => match DaemonConfig::load(&path) {
                Ok(config) if config.ports != ports => {
                    ports = config.ports;
                    publish_ports(&publication, &ports)?;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "keeping previous network config"),
            },
            _ = ticker.tick() => heartbeat.touch(),
        }
    }
}

#[cfg(test)]
#[path = "nim_tests.rs"]
mod tests;
