// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance identity and content-addressed artifact names.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable instance identity. The UUID never changes for the life of the
/// instance; the version moves with each config revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UuidAndVersion {
    pub uuid: Uuid,
    #[serde(default)]
    pub version: String,
}

impl UuidAndVersion {
    pub fn new(uuid: Uuid, version: impl Into<String>) -> Self {
        Self { uuid, version: version.into() }
    }

    pub fn key(&self) -> String {
        self.uuid.to_string()
    }
}

impl std::fmt::Display for UuidAndVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.uuid, self.version)
    }
}

/// Derive the artifact key from its URL and content hash.
///
/// The last path segment of the URL, followed by `.` and the lowercase
/// sha256 when one is known: `https://h/x/disk.qcow2` + `ABC` → `disk.qcow2.abc`.
pub fn safename(url: &str, sha256: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let file = trimmed.rsplit('/').next().unwrap_or(trimmed);
    if sha256.is_empty() {
        file.to_string()
    } else {
        format!("{}.{}", file, sha256.to_lowercase())
    }
}

/// Strip the sha suffix that [`safename`] appended, leaving the file name.
pub fn safename_to_filename(safename: &str) -> &str {
    match safename.rsplit_once('.') {
        Some((file, suffix))
            if suffix.len() == 64 && suffix.bytes().all(|b| b.is_ascii_hexdigit()) =>
        {
            file
        }
        _ => safename,
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
