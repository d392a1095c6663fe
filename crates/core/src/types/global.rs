// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device-wide singletons, all keyed [`GLOBAL_KEY`](crate::GLOBAL_KEY).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::object::GLOBAL_KEY;

const DEFAULT_GC_SECS: u64 = 600;
const DEFAULT_RETRY_SECS: u64 = 600;

/// Tunables distributed by config intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub download_gc_time_secs: u64,
    pub download_retry_time_secs: u64,
    pub verify_retry_time_secs: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            download_gc_time_secs: DEFAULT_GC_SECS,
            download_retry_time_secs: DEFAULT_RETRY_SECS,
            verify_retry_time_secs: DEFAULT_RETRY_SECS,
        }
    }
}

impl GlobalConfig {
    pub fn download_gc_time(&self) -> Duration {
        Duration::from_secs(self.download_gc_time_secs)
    }

    pub fn download_retry_time(&self) -> Duration {
        Duration::from_secs(self.download_retry_time_secs)
    }

    pub fn verify_retry_time(&self) -> Duration {
        Duration::from_secs(self.verify_retry_time_secs)
    }
}

crate::bus_object!(GlobalConfig, "GlobalConfig", |_s| GLOBAL_KEY.to_string());

/// Download quota.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalDownloadConfig {
    pub max_space_kb: u64,
}

crate::bus_object!(GlobalDownloadConfig, "GlobalDownloadConfig", |_s| GLOBAL_KEY.to_string());

/// Quota accounting published by the downloader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalDownloadStatus {
    pub used_space_kb: u64,
    pub reserved_space_kb: u64,
    pub remaining_space_kb: u64,
}

crate::bus_object!(GlobalDownloadStatus, "GlobalDownloadStatus", |_s| GLOBAL_KEY.to_string());
