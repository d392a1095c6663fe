// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Classify a config update against the running status.

use ef_core::{AppInstanceConfig, AppInstanceStatus};

/// What an update requires of the running instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Changes {
    /// Disks, network identity or adapters differ: destroy and recreate
    pub need_purge: bool,
    /// Compute resources differ: stop and start, keeping volumes
    pub need_restart: bool,
}

/// Structural diff of `config` against `status`.
///
/// ACL differences are applied live and never count.
pub fn quantify_changes(config: &AppInstanceConfig, status: &AppInstanceStatus) -> Changes {
    let key = config.uuid_and_version.key();
    let mut changes = Changes::default();

    if status.storage_status_list.len() != config.storage_config_list.len() {
        tracing::info!(
            key,
            from = status.storage_status_list.len(),
            to = config.storage_config_list.len(),
            "storage count changed"
        );
        changes.need_purge = true;
    } else {
        for (sc, ss) in config.storage_config_list.iter().zip(&status.storage_status_list) {
            let differs = !ss.image_sha256.eq_ignore_ascii_case(&sc.image_sha256)
                || ss.read_only != sc.read_only
                || ss.preserve != sc.preserve
                || ss.format != sc.format
                || ss.max_size_bytes != sc.max_size_bytes
                || ss.devtype != sc.devtype;
            if differs {
                tracing::info!(key, name = %sc.name, "storage changed");
                changes.need_purge = true;
            }
        }
    }

    if status.overlay_network_list.len() != config.overlay_network_list.len() {
        tracing::info!(key, "overlay network count changed");
        changes.need_purge = true;
    } else {
        for (oc, os) in config.overlay_network_list.iter().zip(&status.overlay_network_list) {
            if oc.eid != os.eid
                || oc.app_mac != os.app_mac
                || oc.app_ip != os.app_ip
                || oc.network != os.network
            {
                tracing::info!(key, network = %oc.network, "overlay network changed");
                changes.need_purge = true;
            }
            if oc.acls != os.acls {
                tracing::info!(key, network = %oc.network, "overlay ACLs changed");
            }
        }
    }

    if status.underlay_network_list.len() != config.underlay_network_list.len() {
        tracing::info!(key, "underlay network count changed");
        changes.need_purge = true;
    } else {
        for (uc, us) in config.underlay_network_list.iter().zip(&status.underlay_network_list) {
            if uc.app_mac != us.app_mac || uc.app_ip != us.app_ip || uc.network != us.network {
                tracing::info!(key, network = %uc.network, "underlay network changed");
                changes.need_purge = true;
            }
            if uc.acls != us.acls {
                tracing::info!(key, network = %uc.network, "underlay ACLs changed");
            }
        }
    }

    if config.io_adapter_list != status.io_adapter_list {
        tracing::info!(key, "IO adapters changed");
        changes.need_purge = true;
    }
    if config.fixed_resources != status.fixed_resources {
        tracing::info!(key, "fixed resources changed");
        changes.need_restart = true;
    }
    tracing::info!(
        key,
        need_purge = changes.need_purge,
        need_restart = changes.need_restart,
        "quantified changes"
    );
    changes
}

#[cfg(test)]
#[path = "changes_tests.rs"]
mod tests;
