// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `efd.toml`: device-local settings that are not distributed by intake.

use std::path::{Path, PathBuf};

use ef_core::{GlobalConfig, NetworkPortStatus};
use serde::Deserialize;
use thiserror::Error;

/// 4 GiB
const DEFAULT_MAX_SPACE_KB: u64 = 4 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Download quota when intake has no `global-download.json`
    pub max_space_kb: u64,
    /// Tunables when intake has no `global.json`
    pub global: GlobalConfig,
    /// Static management ports published by the network agent
    pub ports: Vec<NetworkPortStatus>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            max_space_kb: DEFAULT_MAX_SPACE_KB,
            global: GlobalConfig::default(),
            ports: Vec::new(),
        }
    }
}

impl DaemonConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ConfigError::Io { path: path.to_path_buf(), source }),
        };
        Self::parse(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
