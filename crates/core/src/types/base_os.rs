// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Base OS images, certificates, and the dual-partition boot state.

use serde::{Deserialize, Serialize};

use super::app_instance::{StorageConfig, StorageStatus};
use crate::id::UuidAndVersion;
use crate::state::SwState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseOsConfig {
    pub uuid_and_version: UuidAndVersion,
    pub base_os_version: String,
    #[serde(default)]
    pub storage_config_list: Vec<StorageConfig>,
    #[serde(default)]
    pub activate: bool,
    /// Set once the new image has booted and passed its checks
    #[serde(default)]
    pub test_complete: bool,
}

crate::bus_object!(BaseOsConfig, "BaseOsConfig", |s| s.uuid_and_version.key());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseOsStatus {
    pub uuid_and_version: UuidAndVersion,
    pub base_os_version: String,
    #[serde(default)]
    pub state: SwState,
    #[serde(default)]
    pub activated: bool,
    #[serde(default)]
    pub test_complete: bool,
    /// Partition holding (or receiving) this version
    #[serde(default)]
    pub partition_label: String,
    #[serde(default)]
    pub storage_status_list: Vec<StorageStatus>,
    #[serde(default)]
    pub missing_datastore: bool,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_time_ms: u64,
}

crate::bus_object!(BaseOsStatus, "BaseOsStatus", |s| s.uuid_and_version.key());

impl BaseOsStatus {
    pub fn from_config(config: &BaseOsConfig) -> Self {
        Self {
            uuid_and_version: config.uuid_and_version.clone(),
            base_os_version: config.base_os_version.clone(),
            state: SwState::Initial,
            activated: false,
            test_complete: false,
            partition_label: String::new(),
            storage_status_list: config
                .storage_config_list
                .iter()
                .map(StorageStatus::from_config)
                .collect(),
            missing_datastore: false,
            error: String::new(),
            error_time_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertObjConfig {
    pub uuid_and_version: UuidAndVersion,
    #[serde(default)]
    pub storage_config_list: Vec<StorageConfig>,
}

crate::bus_object!(CertObjConfig, "CertObjConfig", |s| s.uuid_and_version.key());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertObjStatus {
    pub uuid_and_version: UuidAndVersion,
    #[serde(default)]
    pub state: SwState,
    #[serde(default)]
    pub storage_status_list: Vec<StorageStatus>,
    #[serde(default)]
    pub missing_datastore: bool,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_time_ms: u64,
}

crate::bus_object!(CertObjStatus, "CertObjStatus", |s| s.uuid_and_version.key());

impl CertObjStatus {
    pub fn from_config(config: &CertObjConfig) -> Self {
        Self {
            uuid_and_version: config.uuid_and_version.clone(),
            state: SwState::Initial,
            storage_status_list: config
                .storage_config_list
                .iter()
                .map(StorageStatus::from_config)
                .collect(),
            missing_datastore: false,
            error: String::new(),
            error_time_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionState {
    Active,
    Inprogress,
    #[default]
    Unused,
    Updating,
}

crate::simple_display! {
    PartitionState {
        Active => "active",
        Inprogress => "inprogress",
        Unused => "unused",
        Updating => "updating",
    }
}

/// One of the two boot partitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZbootStatus {
    pub partition_label: String,
    #[serde(default)]
    pub partition_state: PartitionState,
    #[serde(default)]
    pub short_version: String,
    #[serde(default)]
    pub current_partition: bool,
}

crate::bus_object!(ZbootStatus, "ZbootStatus", |s| s.partition_label.clone());
