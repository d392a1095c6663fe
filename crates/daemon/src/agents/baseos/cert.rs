// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Certificate objects: downloaded without verification and copied into
//! the certs directory.

use std::path::{Path, PathBuf};

use ef_bus::HandlerResult;
use ef_core::{
    safename_to_filename, CertObjConfig, CertObjStatus, Clock, ObjType, StorageStatus, SwState,
};

use super::{advance_storage, min_state, rebuild_storage, storage_error, BaseOsContext};

fn install_cert(pending: &Path, dest: &Path) -> std::io::Result<u64> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(pending, dest)
}

impl<C: Clock> BaseOsContext<C> {
    fn cert_file(&self, ss: &StorageStatus) -> PathBuf {
        self.paths.certs_dir().join(safename_to_filename(&ss.safename()))
    }

    fn remove_cert_files(&self, list: &[StorageStatus]) {
        for ss in list.iter().filter(|ss| ss.state == SwState::Delivered) {
            let path = self.cert_file(ss);
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove cert");
            }
        }
    }

    pub(super) fn create_cert(&mut self, key: &str, config: &CertObjConfig) -> HandlerResult {
        tracing::info!(key, version = %config.uuid_and_version.version, "creating cert object");
        let mut status = CertObjStatus::from_config(config);
        self.update_cert(&mut status);
        self.cert_statuses.publish(key, &status)?;
        self.sync_refs()
    }

    pub(super) fn modify_cert(
        &mut self,
        key: &str,
        config: &CertObjConfig,
        mut status: CertObjStatus,
    ) -> HandlerResult {
        if status.uuid_and_version.version == config.uuid_and_version.version {
            tracing::debug!(
                key,
                version = %config.uuid_and_version.version,
                "same cert version; ignored"
            );
            return Ok(());
        }
        tracing::info!(
            key,
            from = %status.uuid_and_version.version,
            to = %config.uuid_and_version.version,
            "cert object changed"
        );
        let previous = std::mem::take(&mut status.storage_status_list);
        status.storage_status_list = rebuild_storage(previous.clone(), &config.storage_config_list);
        let dropped: Vec<StorageStatus> = previous
            .into_iter()
            .filter(|old| {
                !status.storage_status_list.iter().any(|ss| ss.safename() == old.safename())
            })
            .collect();
        self.remove_cert_files(&dropped);
        status.uuid_and_version = config.uuid_and_version.clone();
        self.update_cert(&mut status);
        self.cert_statuses.publish(key, &status)?;
        self.sync_refs()
    }

    pub(super) fn delete_cert(&mut self, key: &str) -> HandlerResult {
        if let Some(status) = self.cert_statuses.get(key) {
            tracing::info!(key, "deleting cert object");
            self.remove_cert_files(&status.storage_status_list);
            self.cert_statuses.unpublish(key)?;
        }
        self.sync_refs()
    }

    pub(super) fn update_cert(&self, status: &mut CertObjStatus) {
        status.missing_datastore = self.datastores_missing(&status.storage_status_list);
        if status.missing_datastore {
            return;
        }
        let now = self.clock.epoch_ms();
        for ss in &mut status.storage_status_list {
            if ss.state == SwState::Delivered {
                continue;
            }
            advance_storage(ss, &self.cert_download_status, None);
            if ss.state != SwState::Downloaded {
                continue;
            }
            let pending = self.paths.pending_file(ObjType::Cert, &ss.image_sha256, &ss.safename());
            let dest = self.cert_file(ss);
            match install_cert(&pending, &dest) {
                Ok(_) => {
                    tracing::info!(cert = %dest.display(), "cert installed");
                    ss.state = SwState::Delivered;
                    ss.active_file = dest.display().to_string();
                }
                Err(e) => {
                    tracing::warn!(
                        pending = %pending.display(),
                        error = %e,
                        "failed to install cert"
                    );
                    ss.error = format!("install cert: {}", e);
                    ss.error_time_ms = now;
                }
            }
        }
        match storage_error(&status.storage_status_list) {
            Some((error, time)) => {
                if status.error != error {
                    status.error = error;
                    status.error_time_ms = time;
                }
            }
            None => {
                status.error.clear();
                status.error_time_ms = 0;
            }
        }
        status.state = min_state(&status.storage_status_list);
    }
}

#[cfg(test)]
#[path = "cert_tests.rs"]
mod tests;
