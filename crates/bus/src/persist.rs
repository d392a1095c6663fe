// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One JSON file per persistent collection.
//!
//! A missing file is an empty collection. A file that no longer parses is
//! moved aside to a `.bak` and the collection starts empty.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::BusError;

/// Current collection file schema version
pub const CURRENT_FILE_VERSION: u32 = 1;

#[derive(Serialize)]
struct FileRef<'a, T> {
    #[serde(rename = "v")]
    version: u32,
    saved_at: DateTime<Utc>,
    items: &'a BTreeMap<String, T>,
}

#[derive(Deserialize)]
struct FileOwned<T> {
    #[serde(rename = "v")]
    #[allow(dead_code)]
    version: u32,
    items: BTreeMap<String, T>,
}

pub(crate) fn load<T: DeserializeOwned>(path: &Path) -> Result<BTreeMap<String, T>, BusError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(source) => return Err(BusError::Persist { path: path.to_owned(), source }),
    };
    match serde_json::from_slice::<FileOwned<T>>(&bytes) {
        Ok(file) => Ok(file.items),
        Err(e) => {
            let bak = bak_path(path);
            tracing::warn!(
                path = %path.display(),
                bak = %bak.display(),
                error = %e,
                "corrupt collection file, moving aside"
            );
            fs::rename(path, &bak)
                .map_err(|source| BusError::Persist { path: path.to_owned(), source })?;
            Ok(BTreeMap::new())
        }
    }
}

/// Write via a temp file and rename so a crash never leaves a torn file.
pub(crate) fn save<T: Serialize>(path: &Path, items: &BTreeMap<String, T>) -> Result<(), BusError> {
    let io_err = |source| BusError::Persist { path: path.to_owned(), source };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file = FileRef { version: CURRENT_FILE_VERSION, saved_at: Utc::now(), items };
    let json = serde_json::to_vec_pretty(&file)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

fn bak_path(path: &Path) -> PathBuf {
    let bak = path.with_extension("bak");
    if bak.exists() {
        let _ = fs::remove_file(&bak);
    }
    bak
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
