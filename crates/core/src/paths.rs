// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk layout under the daemon state directory.

use std::path::{Path, PathBuf};

use crate::agent::AgentName;
use crate::id::safename_to_filename;
use crate::state::ObjType;

/// Directory layout rooted at a state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persistent collections, one file each
    pub fn persist_dir(&self) -> PathBuf {
        self.root.join("persist").join("pubsub")
    }

    /// Liveness touch files
    pub fn run_dir(&self) -> PathBuf {
        self.root.join("run")
    }

    pub fn touch_file(&self, agent: AgentName) -> PathBuf {
        self.run_dir().join(format!("{}.touch", agent))
    }

    /// Directory watched by config intake
    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn certs_dir(&self) -> PathBuf {
        self.root.join("certs")
    }

    /// Image written into a boot partition, `partitions/<label>`
    pub fn partition_file(&self, label: &str) -> PathBuf {
        self.root.join("partitions").join(label)
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    pub fn obj_dir(&self, obj_type: ObjType) -> PathBuf {
        self.downloads_dir().join(obj_type.as_str())
    }

    pub fn pending_dir(&self, obj_type: ObjType) -> PathBuf {
        self.obj_dir(obj_type).join("pending")
    }

    pub fn verified_dir(&self, obj_type: ObjType) -> PathBuf {
        self.obj_dir(obj_type).join("verified")
    }

    /// `downloads/<objType>/pending/<sha>/<safename>`
    pub fn pending_file(&self, obj_type: ObjType, sha256: &str, safename: &str) -> PathBuf {
        let mut dir = self.pending_dir(obj_type);
        if !sha256.is_empty() {
            dir = dir.join(sha256.to_lowercase());
        }
        dir.join(safename)
    }

    /// `downloads/<objType>/verified/<sha>/<filename>`
    pub fn verified_file(&self, obj_type: ObjType, sha256: &str, safename: &str) -> PathBuf {
        self.verified_dir(obj_type).join(sha256.to_lowercase()).join(safename_to_filename(safename))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join("efd.pid")
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join("efd.log")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("efd.toml")
    }
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
