// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application instance config/status and their storage and network parts.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::id::{safename, UuidAndVersion};
use crate::state::{Inprogress, SwState};

/// One disk image an instance (or base OS, or cert) needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub datastore_id: Uuid,
    /// Download URL
    pub name: String,
    pub image_sha256: String,
    /// Expected size in bytes
    pub size: u64,
    pub read_only: bool,
    pub preserve: bool,
    pub format: String,
    pub max_size_bytes: u64,
    pub devtype: String,
    pub target: String,
}

impl StorageConfig {
    pub fn safename(&self) -> String {
        safename(&self.name, &self.image_sha256)
    }
}

/// Per-image progress tracked inside an instance status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageStatus {
    pub datastore_id: Uuid,
    pub name: String,
    pub image_sha256: String,
    pub size: u64,
    pub read_only: bool,
    pub preserve: bool,
    pub format: String,
    pub max_size_bytes: u64,
    pub devtype: String,
    pub target: String,
    pub state: SwState,
    pub progress: u32,
    pub has_downloader_ref: bool,
    pub has_verifier_ref: bool,
    /// Downloader copy expired while inactive; refetched on activation
    pub download_expired: bool,
    /// Path of the verified image once delivered
    pub active_file: String,
    pub error: String,
    pub error_time_ms: u64,
}

impl StorageStatus {
    pub fn from_config(sc: &StorageConfig) -> Self {
        Self {
            datastore_id: sc.datastore_id,
            name: sc.name.clone(),
            image_sha256: sc.image_sha256.clone(),
            size: sc.size,
            read_only: sc.read_only,
            preserve: sc.preserve,
            format: sc.format.clone(),
            max_size_bytes: sc.max_size_bytes,
            devtype: sc.devtype.clone(),
            target: sc.target.clone(),
            ..Self::default()
        }
    }

    pub fn safename(&self) -> String {
        safename(&self.name, &self.image_sha256)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedResources {
    pub vcpus: u32,
    pub memory_kb: u64,
    pub max_mem_kb: u64,
    pub virtualization_mode: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclMatch {
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclEntry {
    pub matches: Vec<AclMatch>,
    pub actions: Vec<String>,
}

/// Overlay endpoint identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EidDetails {
    pub iid: u32,
    pub eid: String,
    pub alloc_prefix: String,
    pub signature: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayNetworkConfig {
    pub network: Uuid,
    pub eid: EidDetails,
    pub app_mac: String,
    pub app_ip: String,
    pub acls: Vec<AclEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnderlayNetworkConfig {
    pub network: Uuid,
    pub app_mac: String,
    pub app_ip: String,
    pub acls: Vec<AclEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoAdapter {
    pub kind: String,
    pub name: String,
}

/// Monotonic command counter; a change, not the value, is the trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmdCounter {
    pub counter: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInstanceConfig {
    pub uuid_and_version: UuidAndVersion,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub activate: bool,
    #[serde(default)]
    pub fixed_resources: FixedResources,
    #[serde(default)]
    pub storage_config_list: Vec<StorageConfig>,
    #[serde(default)]
    pub overlay_network_list: Vec<OverlayNetworkConfig>,
    #[serde(default)]
    pub underlay_network_list: Vec<UnderlayNetworkConfig>,
    #[serde(default)]
    pub io_adapter_list: Vec<IoAdapter>,
    #[serde(default)]
    pub restart_cmd: CmdCounter,
    #[serde(default)]
    pub purge_cmd: CmdCounter,
    /// Validation errors found by config intake
    #[serde(default)]
    pub errors: Vec<String>,
}

crate::bus_object!(AppInstanceConfig, "AppInstanceConfig", |s| s.uuid_and_version.key());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInstanceStatus {
    pub uuid_and_version: UuidAndVersion,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub state: SwState,
    #[serde(default)]
    pub activated: bool,
    #[serde(default)]
    pub restart_inprogress: Inprogress,
    #[serde(default)]
    pub purge_inprogress: Inprogress,
    #[serde(default)]
    pub restart_cmd: CmdCounter,
    #[serde(default)]
    pub purge_cmd: CmdCounter,
    /// Restart counter moved while not activated
    #[serde(default)]
    pub pending_restart: bool,
    #[serde(default)]
    pub fixed_resources: FixedResources,
    #[serde(default)]
    pub storage_status_list: Vec<StorageStatus>,
    #[serde(default)]
    pub overlay_network_list: Vec<OverlayNetworkConfig>,
    #[serde(default)]
    pub underlay_network_list: Vec<UnderlayNetworkConfig>,
    #[serde(default)]
    pub io_adapter_list: Vec<IoAdapter>,
    /// Assigned overlay endpoints, from identity-manager status
    #[serde(default)]
    pub eid_list: Vec<EidDetails>,
    #[serde(default)]
    pub missing_datastore: bool,
    #[serde(default)]
    pub missing_network: bool,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_time_ms: u64,
}

crate::bus_object!(AppInstanceStatus, "AppInstanceStatus", |s| s.uuid_and_version.key());

impl AppInstanceStatus {
    /// Fresh status mirroring a config, before any work has happened.
    pub fn from_config(config: &AppInstanceConfig) -> Self {
        Self {
            uuid_and_version: config.uuid_and_version.clone(),
            display_name: config.display_name.clone(),
            state: SwState::Initial,
            activated: false,
            restart_inprogress: Inprogress::None,
            purge_inprogress: Inprogress::None,
            restart_cmd: config.restart_cmd,
            purge_cmd: config.purge_cmd,
            pending_restart: false,
            fixed_resources: config.fixed_resources.clone(),
            storage_status_list: config
                .storage_config_list
                .iter()
                .map(StorageStatus::from_config)
                .collect(),
            overlay_network_list: config.overlay_network_list.clone(),
            underlay_network_list: config.underlay_network_list.clone(),
            io_adapter_list: config.io_adapter_list.clone(),
            eid_list: Vec::new(),
            missing_datastore: false,
            missing_network: false,
            error: String::new(),
            error_time_ms: 0,
        }
    }

    pub fn set_error(&mut self, error: impl Into<String>, now_ms: u64) {
        self.error = error.into();
        self.error_time_ms = now_ms;
    }

    pub fn clear_error(&mut self) {
        self.error.clear();
        self.error_time_ms = 0;
    }
}
