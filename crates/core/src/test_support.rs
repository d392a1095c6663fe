// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixture constructors and proptest strategies for tests across crates.

use proptest::prelude::*;
use uuid::Uuid;

use crate::id::{safename, UuidAndVersion};
use crate::state::{ObjType, SwState};
use crate::types::*;

pub fn storage(datastore_id: Uuid, url: &str, sha256: &str, size: u64) -> StorageConfig {
    StorageConfig {
        datastore_id,
        name: url.to_string(),
        image_sha256: sha256.to_string(),
        size,
        format: "qcow2".to_string(),
        devtype: "disk".to_string(),
        target: "disk".to_string(),
        ..StorageConfig::default()
    }
}

pub fn app_config(uuid: Uuid, storage_config_list: Vec<StorageConfig>) -> AppInstanceConfig {
    AppInstanceConfig {
        uuid_and_version: UuidAndVersion::new(uuid, "1"),
        display_name: format!("app-{}", &uuid.to_string()[..8]),
        activate: false,
        fixed_resources: FixedResources {
            vcpus: 1,
            memory_kb: 524_288,
            max_mem_kb: 524_288,
            ..FixedResources::default()
        },
        storage_config_list,
        overlay_network_list: Vec::new(),
        underlay_network_list: Vec::new(),
        io_adapter_list: Vec::new(),
        restart_cmd: CmdCounter::default(),
        purge_cmd: CmdCounter::default(),
        errors: Vec::new(),
    }
}

pub fn downloader_config(
    obj_type: ObjType,
    url: &str,
    sha256: &str,
    size: u64,
    ref_count: u32,
) -> DownloaderConfig {
    DownloaderConfig {
        safename: safename(url, sha256),
        obj_type,
        datastore_id: Uuid::nil(),
        download_url: url.to_string(),
        transport: "file".to_string(),
        dpath: String::new(),
        api_key: String::new(),
        password: String::new(),
        image_sha256: sha256.to_string(),
        size,
        use_free_mgmt_ports: false,
        ref_count,
    }
}

pub fn file_datastore(uuid: Uuid) -> DatastoreConfig {
    DatastoreConfig {
        uuid,
        transport: "file".to_string(),
        fqdn: String::new(),
        dpath: String::new(),
        api_key: String::new(),
        password: String::new(),
        region: String::new(),
    }
}

/// One free management port with a routable address.
pub fn network_ready() -> DeviceNetworkStatus {
    DeviceNetworkStatus {
        testing: false,
        ports: vec![NetworkPortStatus {
            if_name: "eth0".to_string(),
            free: true,
            addrs: vec![std::net::IpAddr::from([10, 0, 0, 2])],
        }],
    }
}

pub fn arb_sw_state() -> impl Strategy<Value = SwState> {
    prop_oneof![
        Just(SwState::Initial),
        Just(SwState::DownloadStarted),
        Just(SwState::Downloaded),
        Just(SwState::Delivered),
        Just(SwState::Installed),
    ]
}

pub fn arb_obj_type() -> impl Strategy<Value = ObjType> {
    prop_oneof![Just(ObjType::AppImg), Just(ObjType::BaseOs), Just(ObjType::Cert)]
}
