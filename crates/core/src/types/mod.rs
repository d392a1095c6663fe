// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config and status records carried on the bus.
//!
//! Config records are desired state owned by an upstream agent; status
//! records are observed state owned by the agent driving the lifecycle.

mod app_instance;
mod base_os;
mod collaborators;
mod datastore;
mod download;
mod global;
mod network;
mod uuid_to_num;

pub use app_instance::{
    AclEntry, AclMatch, AppInstanceConfig, AppInstanceStatus, CmdCounter, EidDetails,
    FixedResources, IoAdapter, OverlayNetworkConfig, StorageConfig, StorageStatus,
    UnderlayNetworkConfig,
};
pub use base_os::{
    BaseOsConfig, BaseOsStatus, CertObjConfig, CertObjStatus, PartitionState, ZbootStatus,
};
pub use collaborators::{
    AppNetworkConfig, AppNetworkStatus, DomainConfig, DomainStatus, EidConfig, EidStatus,
};
pub use datastore::DatastoreConfig;
pub use download::{DownloaderConfig, DownloaderStatus, VerifyImageConfig, VerifyImageStatus};
pub use global::{GlobalConfig, GlobalDownloadConfig, GlobalDownloadStatus};
pub use network::{DeviceNetworkStatus, NetworkPortStatus};
pub use uuid_to_num::{UuidToNum, PURGE_CMD_COUNTER, RESTART_CMD_COUNTER};
