// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One pass of the instance state machine.
//!
//! `do_update` never blocks: it moves the status as far as the current
//! collaborator statuses allow and returns. Any later change to those
//! statuses triggers another pass.

use ef_bus::BusError;
use ef_core::{
    AppInstanceConfig, AppInstanceStatus, AppNetworkConfig, Clock, DomainConfig, EidConfig,
    Inprogress, StorageStatus, SwState, PURGE_CMD_COUNTER,
};

use super::AppInstContext;

/// Whether the pass reached a point where it must wait.
enum Step {
    Continue,
    Wait,
}

impl<C: Clock> AppInstContext<C> {
    pub(super) fn do_update(
        &self,
        config: &AppInstanceConfig,
        status: &mut AppInstanceStatus,
    ) -> Result<(), BusError> {
        let key = config.uuid_and_version.key();
        status.activated = self.domain_status.get(&key).is_some_and(|d| d.activated);
        if !status.activated {
            // A stopped domain starts with the latest resources anyway
            status.pending_restart = false;
        }

        let mut missing_datastore = false;
        for ss in &mut status.storage_status_list {
            if self.datastores.get(&ss.datastore_id.to_string()).is_none() {
                tracing::info!(key, datastore = %ss.datastore_id, "datastore not yet known");
                missing_datastore = true;
                continue;
            }
            self.update_storage(config.activate, ss);
        }
        status.missing_datastore = missing_datastore;
        if missing_datastore {
            return Ok(());
        }

        let errors: Vec<&str> = status
            .storage_status_list
            .iter()
            .map(|ss| ss.error.as_str())
            .filter(|e| !e.is_empty())
            .collect();
        if errors.is_empty() {
            status.clear_error();
        } else {
            let joined = errors.join("; ");
            let time = status
                .storage_status_list
                .iter()
                .map(|ss| ss.error_time_ms)
                .max()
                .unwrap_or_default();
            if status.error != joined {
                status.set_error(joined, time);
            }
        }

        let min = if status.storage_status_list.is_empty() {
            SwState::Delivered
        } else {
            SwState::min_of(status.storage_status_list.iter().map(|ss| ss.state))
        };
        if min < SwState::Delivered {
            if !status.state.is_excursion() {
                status.state = min;
            }
            return Ok(());
        }
        if status.purge_inprogress == Inprogress::Download {
            tracing::info!(key, "purge images delivered");
            status.purge_inprogress = Inprogress::BringDown;
        }

        if let Step::Wait = self.update_eids(config, status)? {
            settle_state(status);
            return Ok(());
        }

        let step = if config.activate {
            self.activate(config, status)?
        } else {
            self.deactivate(config, status)?
        };
        if let Step::Continue = step {
            if status.purge_inprogress == Inprogress::BringUp {
                tracing::info!(key, counter = status.purge_cmd.counter, "purge complete");
                status.purge_inprogress = Inprogress::None;
                let now = self.clock.epoch_ms();
                self.counters.set(
                    &config.uuid_and_version.uuid,
                    PURGE_CMD_COUNTER,
                    status.purge_cmd.counter,
                    now,
                )?;
            }
            if status.restart_inprogress == Inprogress::BringUp {
                tracing::info!(key, "restart complete");
                status.restart_inprogress = Inprogress::None;
            }
        }
        settle_state(status);
        Ok(())
    }

    /// Move one image forward from the downloader and verifier statuses.
    fn update_storage(&self, activate: bool, ss: &mut StorageStatus) {
        let name = ss.safename();
        if let Some(vs) =
            self.verify_status.get(&name).filter(|vs| vs.state == SwState::Delivered)
        {
            ss.has_verifier_ref = true;
            ss.has_downloader_ref = true;
            ss.download_expired = false;
            ss.state = SwState::Delivered;
            ss.progress = 100;
            ss.active_file = vs.verified_path;
            ss.error.clear();
            ss.error_time_ms = 0;
            return;
        }

        if !ss.has_downloader_ref {
            if ss.download_expired && !activate {
                return;
            }
            tracing::debug!(safename = %name, "taking download reference");
            ss.has_downloader_ref = true;
            ss.download_expired = false;
        }
        let Some(ds) = self.download_status.get(&name) else {
            return;
        };
        if ds.expired && !activate {
            tracing::info!(safename = %name, "download expired; releasing");
            ss.has_downloader_ref = false;
            ss.download_expired = true;
            ss.state = SwState::Initial;
            ss.progress = 0;
            return;
        }
        ss.progress = ds.progress;
        ss.error = ds.last_err.clone();
        ss.error_time_ms = ds.last_err_time_ms;
        if ds.state < SwState::Downloaded {
            ss.state = ds.state;
            return;
        }
        ss.state = SwState::Downloaded;
        ss.has_verifier_ref = true;
        if let Some(vs) = self.verify_status.get(&name).filter(|vs| !vs.last_err.is_empty()) {
            ss.error = vs.last_err;
            ss.error_time_ms = vs.last_err_time_ms;
        }
    }

    /// Request one endpoint per overlay network and collect the answers.
    fn update_eids(
        &self,
        config: &AppInstanceConfig,
        status: &mut AppInstanceStatus,
    ) -> Result<Step, BusError> {
        let uuid = config.uuid_and_version.uuid;
        let mut wanted = Vec::new();
        for overlay in &config.overlay_network_list {
            let eid = EidConfig {
                uuid_and_version: config.uuid_and_version.clone(),
                display_name: config.display_name.clone(),
                details: overlay.eid.clone(),
            };
            let eid_key = format!("{}:{}", uuid, overlay.eid.iid);
            self.eids.publish(&eid_key, &eid)?;
            wanted.push(eid_key);
        }
        for (eid_key, eid) in self.eids.get_all() {
            if eid.uuid_and_version.uuid == uuid && !wanted.contains(&eid_key) {
                self.eids.unpublish(&eid_key)?;
            }
        }

        let mut assigned = Vec::with_capacity(wanted.len());
        for eid_key in &wanted {
            match self.eid_status.get(eid_key) {
                Some(es) => assigned.push(es.details),
                None => {
                    tracing::debug!(eid = %eid_key, "waiting for endpoint");
                    return Ok(Step::Wait);
                }
            }
        }
        status.eid_list = assigned;
        Ok(Step::Continue)
    }

    fn publish_network(&self, config: &AppInstanceConfig, activate: bool) -> Result<(), BusError> {
        let network = AppNetworkConfig {
            uuid_and_version: config.uuid_and_version.clone(),
            display_name: config.display_name.clone(),
            activate,
            overlay_network_list: config.overlay_network_list.clone(),
            underlay_network_list: config.underlay_network_list.clone(),
        };
        self.networks.publish(&config.uuid_and_version.key(), &network)
    }

    fn publish_domain(
        &self,
        config: &AppInstanceConfig,
        status: &AppInstanceStatus,
        activate: bool,
    ) -> Result<(), BusError> {
        let domain = DomainConfig {
            uuid_and_version: config.uuid_and_version.clone(),
            display_name: config.display_name.clone(),
            activate,
            vcpus: config.fixed_resources.vcpus,
            memory_kb: config.fixed_resources.memory_kb,
            disk_paths: status
                .storage_status_list
                .iter()
                .map(|ss| ss.active_file.clone())
                .collect(),
            io_adapter_list: config.io_adapter_list.clone(),
        };
        self.domains.publish(&config.uuid_and_version.key(), &domain)
    }

    /// Stop the domain if it runs, then remove it entirely.
    fn remove_domain(&self, key: &str, status: &mut AppInstanceStatus) -> Result<Step, BusError> {
        if self.domains.get(key).is_some() {
            self.domains.unpublish(key)?;
        }
        if self.domain_status.get(key).is_some() {
            tracing::debug!(key, "waiting for domain removal");
            return Ok(Step::Wait);
        }
        status.activated = false;
        Ok(Step::Continue)
    }

    /// Ask for a stopped domain and wait until it reports stopped.
    fn stop_domain(&self, key: &str, status: &mut AppInstanceStatus) -> Result<Step, BusError> {
        if let Some(mut domain) = self.domains.get(key).filter(|d| d.activate) {
            domain.activate = false;
            self.domains.publish(key, &domain)?;
        }
        if status.activated {
            tracing::debug!(key, "waiting for domain to stop");
            return Ok(Step::Wait);
        }
        Ok(Step::Continue)
    }

    fn activate(
        &self,
        config: &AppInstanceConfig,
        status: &mut AppInstanceStatus,
    ) -> Result<Step, BusError> {
        let key = config.uuid_and_version.key();
        self.publish_network(config, true)?;
        match self.network_status.get(&key) {
            Some(ns) if !ns.error.is_empty() => {
                if status.error != ns.error {
                    status.set_error(ns.error, self.clock.epoch_ms());
                }
                return Ok(Step::Wait);
            }
            Some(ns) if ns.activated => {}
            _ => {
                tracing::debug!(key, "waiting for app network");
                return Ok(Step::Wait);
            }
        }

        if status.purge_inprogress == Inprogress::BringDown {
            if let Step::Wait = self.remove_domain(&key, status)? {
                return Ok(Step::Wait);
            }
            status.purge_inprogress = Inprogress::BringUp;
        }
        if status.restart_inprogress == Inprogress::BringDown {
            if let Step::Wait = self.stop_domain(&key, status)? {
                return Ok(Step::Wait);
            }
            status.restart_inprogress = Inprogress::BringUp;
        }

        self.publish_domain(config, status, true)?;
        match self.domain_status.get(&key) {
            Some(ds) if !ds.error.is_empty() => {
                if status.error != ds.error {
                    status.set_error(ds.error, self.clock.epoch_ms());
                }
                Ok(Step::Wait)
            }
            Some(ds) if ds.activated => Ok(Step::Continue),
            _ => {
                tracing::debug!(key, "waiting for domain to start");
                Ok(Step::Wait)
            }
        }
    }

    fn deactivate(
        &self,
        config: &AppInstanceConfig,
        status: &mut AppInstanceStatus,
    ) -> Result<Step, BusError> {
        let key = config.uuid_and_version.key();
        if let Step::Wait = self.stop_domain(&key, status)? {
            return Ok(Step::Wait);
        }
        status.restart_inprogress = Inprogress::None;
        if status.purge_inprogress == Inprogress::BringDown {
            if let Step::Wait = self.remove_domain(&key, status)? {
                return Ok(Step::Wait);
            }
            status.purge_inprogress = Inprogress::BringUp;
        }
        self.publish_network(config, false)?;
        Ok(Step::Continue)
    }
}

/// Summarise the steady state unless an excursion is in progress.
fn settle_state(status: &mut AppInstanceStatus) {
    status.state = if status.purge_inprogress != Inprogress::None {
        SwState::Purging
    } else if status.restart_inprogress != Inprogress::None {
        SwState::Restarting
    } else if status.activated {
        SwState::Installed
    } else {
        SwState::Delivered
    };
}

#[cfg(test)]
#[path = "update_tests.rs"]
mod tests;
