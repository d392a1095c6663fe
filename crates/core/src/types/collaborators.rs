// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Records exchanged with the identity, routing and domain collaborators.

use serde::{Deserialize, Serialize};

use super::app_instance::{EidDetails, IoAdapter, OverlayNetworkConfig, UnderlayNetworkConfig};
use crate::id::UuidAndVersion;
use crate::state::SwState;

/// Overlay endpoint request for one instance network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EidConfig {
    pub uuid_and_version: UuidAndVersion,
    #[serde(default)]
    pub display_name: String,
    pub details: EidDetails,
}

crate::bus_object!(EidConfig, "EIDConfig", |s| {
    format!("{}:{}", s.uuid_and_version.uuid, s.details.iid)
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EidStatus {
    pub uuid_and_version: UuidAndVersion,
    #[serde(default)]
    pub display_name: String,
    pub details: EidDetails,
}

crate::bus_object!(EidStatus, "EIDStatus", |s| {
    format!("{}:{}", s.uuid_and_version.uuid, s.details.iid)
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppNetworkConfig {
    pub uuid_and_version: UuidAndVersion,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub activate: bool,
    #[serde(default)]
    pub overlay_network_list: Vec<OverlayNetworkConfig>,
    #[serde(default)]
    pub underlay_network_list: Vec<UnderlayNetworkConfig>,
}

crate::bus_object!(AppNetworkConfig, "AppNetworkConfig", |s| s.uuid_and_version.key());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppNetworkStatus {
    pub uuid_and_version: UuidAndVersion,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub activated: bool,
    #[serde(default)]
    pub error: String,
}

crate::bus_object!(AppNetworkStatus, "AppNetworkStatus", |s| s.uuid_and_version.key());

/// Request to run (or stop) the workload itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    pub uuid_and_version: UuidAndVersion,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub activate: bool,
    #[serde(default)]
    pub vcpus: u32,
    #[serde(default)]
    pub memory_kb: u64,
    #[serde(default)]
    pub disk_paths: Vec<String>,
    #[serde(default)]
    pub io_adapter_list: Vec<IoAdapter>,
}

crate::bus_object!(DomainConfig, "DomainConfig", |s| s.uuid_and_version.key());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainStatus {
    pub uuid_and_version: UuidAndVersion,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub activated: bool,
    #[serde(default)]
    pub state: SwState,
    #[serde(default)]
    pub error: String,
}

crate::bus_object!(DomainStatus, "DomainStatus", |s| s.uuid_and_version.key());
