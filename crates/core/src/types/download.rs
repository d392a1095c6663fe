// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Downloader and verifier records, keyed by safename and scoped by [`ObjType`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::{ObjType, SwState};

/// Request to materialize one artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloaderConfig {
    pub safename: String,
    pub obj_type: ObjType,
    #[serde(default)]
    pub datastore_id: Uuid,
    pub download_url: String,
    /// Transfer scheme, from the datastore
    #[serde(default)]
    pub transport: String,
    #[serde(default)]
    pub dpath: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub image_sha256: String,
    /// Expected size in bytes
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub use_free_mgmt_ports: bool,
    /// Consumers wanting the artifact; zero keeps metadata only
    #[serde(default)]
    pub ref_count: u32,
}

crate::bus_object!(DownloaderConfig, "DownloaderConfig", |s| s.safename.clone());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloaderStatus {
    pub safename: String,
    pub obj_type: ObjType,
    #[serde(default)]
    pub datastore_id: Uuid,
    pub download_url: String,
    #[serde(default)]
    pub image_sha256: String,
    #[serde(default)]
    pub use_free_mgmt_ports: bool,
    #[serde(default)]
    pub ref_count: u32,
    #[serde(default)]
    pub last_use_ms: u64,
    /// Garbage-collection mark; the consumer issues the delete
    #[serde(default)]
    pub expired: bool,
    #[serde(default)]
    pub state: SwState,
    #[serde(default)]
    pub reserved_space_kb: u64,
    /// Downloaded size in bytes
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub pending_add: bool,
    #[serde(default)]
    pub mod_time_ms: u64,
    #[serde(default)]
    pub last_err: String,
    #[serde(default)]
    pub last_err_time_ms: u64,
    #[serde(default)]
    pub retry_count: u32,
}

crate::bus_object!(DownloaderStatus, "DownloaderStatus", |s| s.safename.clone());

impl DownloaderStatus {
    pub fn from_config(config: &DownloaderConfig, now_ms: u64) -> Self {
        Self {
            safename: config.safename.clone(),
            obj_type: config.obj_type,
            datastore_id: config.datastore_id,
            download_url: config.download_url.clone(),
            image_sha256: config.image_sha256.clone(),
            use_free_mgmt_ports: config.use_free_mgmt_ports,
            ref_count: config.ref_count,
            last_use_ms: now_ms,
            expired: false,
            state: SwState::Initial,
            reserved_space_kb: 0,
            size: 0,
            progress: 0,
            pending_add: true,
            mod_time_ms: 0,
            last_err: String::new(),
            last_err_time_ms: 0,
            retry_count: 0,
        }
    }

    pub fn record_error(&mut self, err: impl Into<String>, now_ms: u64) {
        self.last_err = err.into();
        self.last_err_time_ms = now_ms;
        self.retry_count += 1;
    }

    pub fn clear_error(&mut self) {
        self.last_err.clear();
        self.last_err_time_ms = 0;
    }
}

/// Request to check a downloaded artifact against its hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyImageConfig {
    pub safename: String,
    pub obj_type: ObjType,
    pub image_sha256: String,
    #[serde(default)]
    pub ref_count: u32,
}

crate::bus_object!(VerifyImageConfig, "VerifyImageConfig", |s| s.safename.clone());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyImageStatus {
    pub safename: String,
    pub obj_type: ObjType,
    pub image_sha256: String,
    #[serde(default)]
    pub ref_count: u32,
    #[serde(default)]
    pub state: SwState,
    #[serde(default)]
    pub pending_add: bool,
    /// Size in bytes of the verified file
    #[serde(default)]
    pub size: u64,
    /// Location of the verified file
    #[serde(default)]
    pub verified_path: String,
    #[serde(default)]
    pub last_use_ms: u64,
    #[serde(default)]
    pub expired: bool,
    #[serde(default)]
    pub last_err: String,
    #[serde(default)]
    pub last_err_time_ms: u64,
}

crate::bus_object!(VerifyImageStatus, "VerifyImageStatus", |s| s.safename.clone());
