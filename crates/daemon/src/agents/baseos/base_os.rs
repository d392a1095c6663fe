// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Base OS lifecycle: download, verify, install into the spare partition,
//! and confirm once the booted image has passed its test.

use std::path::Path;

use ef_bus::HandlerResult;
use ef_core::{safename, BaseOsConfig, BaseOsStatus, Clock, PartitionState, SwState};

use super::{
    advance_storage, min_state, rebuild_storage, release_refs, storage_error, BaseOsContext,
};

fn set_error(status: &mut BaseOsStatus, error: String, now_ms: u64) {
    if status.error != error {
        status.error = error;
        status.error_time_ms = now_ms;
    }
}

fn clear_error(status: &mut BaseOsStatus) {
    status.error.clear();
    status.error_time_ms = 0;
}

/// Copy the verified image into the partition slot.
fn write_partition(image: &Path, dest: &Path) -> std::io::Result<u64> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(image, dest)
}

impl<C: Clock> BaseOsContext<C> {
    pub(super) fn create_base_os(&mut self, key: &str, config: &BaseOsConfig) -> HandlerResult {
        tracing::info!(key, version = %config.base_os_version, "creating base OS");
        let mut status = BaseOsStatus::from_config(config);
        self.update_base_os(key, config, &mut status)?;
        self.statuses.publish(key, &status)?;
        self.sync_refs()
    }

    pub(super) fn modify_base_os(
        &mut self,
        key: &str,
        config: &BaseOsConfig,
        mut status: BaseOsStatus,
    ) -> HandlerResult {
        let images_changed = status.storage_status_list.len() != config.storage_config_list.len()
            || status
                .storage_status_list
                .iter()
                .zip(&config.storage_config_list)
                .any(|(ss, sc)| ss.safename() != safename(&sc.name, &sc.image_sha256));
        if status.base_os_version != config.base_os_version || images_changed {
            tracing::info!(
                key,
                from = %status.base_os_version,
                to = %config.base_os_version,
                "base OS changed"
            );
            self.cancel_install(&status)?;
            let previous = std::mem::take(&mut status.storage_status_list);
            status.storage_status_list = rebuild_storage(previous, &config.storage_config_list);
            status.base_os_version = config.base_os_version.clone();
            status.partition_label.clear();
            status.activated = false;
            status.test_complete = false;
            status.state = SwState::Initial;
        }
        status.uuid_and_version = config.uuid_and_version.clone();
        self.update_base_os(key, config, &mut status)?;
        self.statuses.publish(key, &status)?;
        self.sync_refs()
    }

    pub(super) fn delete_base_os(&mut self, key: &str) -> HandlerResult {
        if let Some(status) = self.statuses.get(key) {
            tracing::info!(key, version = %status.base_os_version, "deleting base OS");
            self.cancel_install(&status)?;
            self.statuses.unpublish(key)?;
        }
        self.sync_refs()
    }

    /// Undo a written but not yet booted install of this status's version.
    fn cancel_install(&self, status: &BaseOsStatus) -> HandlerResult {
        match self.zboot.holding(&status.base_os_version) {
            Some(p) if !p.current_partition => self.zboot.cancel(&p.partition_label),
            _ => Ok(()),
        }
    }

    fn validate(&self, key: &str, config: &BaseOsConfig) -> Result<(), String> {
        if config.storage_config_list.len() != 1 {
            return Err(format!(
                "base OS {} needs exactly one image, found {}",
                config.base_os_version,
                config.storage_config_list.len()
            ));
        }
        if config.activate {
            let conflict = self.configs.get_all().into_iter().find(|(k, c)| k != key && c.activate);
            if let Some((_, other)) = conflict {
                return Err(format!(
                    "base OS {} and {} are both activated",
                    config.base_os_version, other.base_os_version
                ));
            }
        }
        Ok(())
    }

    /// One pass of the base OS state machine.
    pub(super) fn update_base_os(
        &self,
        key: &str,
        config: &BaseOsConfig,
        status: &mut BaseOsStatus,
    ) -> HandlerResult {
        let now = self.clock.epoch_ms();
        if let Err(error) = self.validate(key, config) {
            tracing::warn!(key, %error, "invalid base OS config");
            set_error(status, error, now);
            release_refs(&mut status.storage_status_list);
            return Ok(());
        }

        match self.zboot.holding(&config.base_os_version) {
            Some(p) if p.current_partition || config.activate => {
                status.partition_label = p.partition_label.clone();
                status.activated = p.current_partition;
                status.test_complete =
                    p.current_partition && p.partition_state == PartitionState::Active;
                if status.activated
                    && config.test_complete
                    && p.partition_state == PartitionState::Inprogress
                {
                    tracing::info!(
                        key,
                        label = %p.partition_label,
                        "test complete; keeping partition"
                    );
                    self.zboot.mark_active(&p.partition_label)?;
                    status.test_complete = true;
                }
                status.state = SwState::Installed;
                clear_error(status);
                release_refs(&mut status.storage_status_list);
                return Ok(());
            }
            Some(p) => {
                tracing::info!(key, label = %p.partition_label, "deactivated before boot");
                self.zboot.cancel(&p.partition_label)?;
            }
            None => {}
        }
        status.partition_label.clear();
        status.activated = false;
        status.test_complete = false;

        status.missing_datastore = self.datastores_missing(&status.storage_status_list);
        if status.missing_datastore {
            return Ok(());
        }
        for ss in &mut status.storage_status_list {
            advance_storage(ss, &self.download_status, Some(&self.verify_status));
        }
        match storage_error(&status.storage_status_list) {
            Some((error, time)) => {
                if status.error != error {
                    status.error = error;
                    status.error_time_ms = time;
                }
            }
            None => clear_error(status),
        }
        let min = min_state(&status.storage_status_list);
        status.state = min.min(SwState::Delivered);
        if min < SwState::Delivered || !config.activate {
            return Ok(());
        }
        self.install(key, config, status)
    }

    fn install(
        &self,
        key: &str,
        config: &BaseOsConfig,
        status: &mut BaseOsStatus,
    ) -> HandlerResult {
        let now = self.clock.epoch_ms();
        let (Some(current), Some(target)) = (self.zboot.current(), self.zboot.other()) else {
            set_error(status, "partition table incomplete".to_string(), now);
            return Ok(());
        };
        if current.partition_state == PartitionState::Inprogress {
            let error = format!("partition {} is still being tested", current.partition_label);
            set_error(status, error, now);
            return Ok(());
        }
        let Some(image) = status.storage_status_list.first().map(|ss| ss.active_file.clone()) else {
            return Ok(());
        };

        let label = target.partition_label;
        let dest = self.paths.partition_file(&label);
        match write_partition(Path::new(&image), &dest) {
            Ok(bytes) => tracing::info!(
                key,
                label,
                bytes,
                version = %config.base_os_version,
                "image written"
            ),
            Err(e) => {
                tracing::warn!(key, label, error = %e, "failed to write partition");
                set_error(status, format!("install into {}: {}", label, e), now);
                return Ok(());
            }
        }
        self.zboot.install(&label, &config.base_os_version)?;
        status.partition_label = label;
        status.state = SwState::Installed;
        clear_error(status);
        release_refs(&mut status.storage_status_list);
        Ok(())
    }
}

#[cfg(test)]
#[path = "base_os_tests.rs"]
mod tests;
