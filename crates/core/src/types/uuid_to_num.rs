// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PURGE_CMD_COUNTER: &str = "purgeCmdCounter";
pub const RESTART_CMD_COUNTER: &str = "restartCmdCounter";

/// A counter remembered per `(uuid, tag)` across reboots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UuidToNum {
    pub uuid: Uuid,
    pub tag: String,
    pub number: u32,
    #[serde(default)]
    pub last_use_ms: u64,
    #[serde(default)]
    pub in_use: bool,
}

impl UuidToNum {
    pub fn key_for(uuid: &Uuid, tag: &str) -> String {
        format!("{}.{}", uuid, tag)
    }
}

crate::bus_object!(UuidToNum, "UuidToNum", |s| UuidToNum::key_for(&s.uuid, &s.tag));
