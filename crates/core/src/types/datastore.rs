// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where and how images referencing this datastore are fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreConfig {
    pub uuid: Uuid,
    /// Transfer scheme (`file`, `http`, `s3`, ...)
    pub transport: String,
    #[serde(default)]
    pub fqdn: String,
    #[serde(default)]
    pub dpath: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub region: String,
}

crate::bus_object!(DatastoreConfig, "DatastoreConfig", |s| s.uuid.to_string());
