// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Level-triggered reference counting for artifacts shared by several
//! consumers.
//!
//! Consumers never increment or decrement a count in place. After any change
//! they tally the references held by every one of their statuses and bring
//! the published downloader and verifier configs in line with the tally, so
//! a replayed or reordered event cannot leak or double-drop a reference.

use std::collections::BTreeMap;

use ef_bus::{BusError, Publication, SubView};
use ef_core::{DatastoreConfig, DownloaderConfig, ObjType, StorageStatus, VerifyImageConfig};

#[derive(Debug, Clone)]
struct Tally {
    holders: u32,
    wanted: u32,
    storage: StorageStatus,
}

/// References to artifacts, keyed by safename.
#[derive(Debug, Default)]
pub(crate) struct RefTally {
    entries: BTreeMap<String, Tally>,
}

impl RefTally {
    /// Count one holder. `wanted` holders need the bytes materialized now.
    pub fn hold(&mut self, storage: &StorageStatus, wanted: bool) {
        let entry = self.entries.entry(storage.safename()).or_insert_with(|| Tally {
            holders: 0,
            wanted: 0,
            storage: storage.clone(),
        });
        entry.holders += 1;
        if wanted {
            entry.wanted += 1;
        }
    }

    pub fn holders(&self, safename: &str) -> u32 {
        self.entries.get(safename).map_or(0, |t| t.holders)
    }

    pub fn wanted(&self, safename: &str) -> u32 {
        self.entries.get(safename).map_or(0, |t| t.wanted)
    }
}

pub(crate) fn downloader_config(
    obj_type: ObjType,
    storage: &StorageStatus,
    datastore: Option<&DatastoreConfig>,
    ref_count: u32,
) -> DownloaderConfig {
    DownloaderConfig {
        safename: storage.safename(),
        obj_type,
        datastore_id: storage.datastore_id,
        download_url: storage.name.clone(),
        transport: datastore.map(|d| d.transport.clone()).unwrap_or_default(),
        dpath: datastore.map(|d| d.dpath.clone()).unwrap_or_default(),
        api_key: datastore.map(|d| d.api_key.clone()).unwrap_or_default(),
        password: datastore.map(|d| d.password.clone()).unwrap_or_default(),
        image_sha256: storage.image_sha256.clone(),
        size: storage.size,
        use_free_mgmt_ports: false,
        ref_count,
    }
}

pub(crate) fn verifier_config(
    obj_type: ObjType,
    storage: &StorageStatus,
    ref_count: u32,
) -> VerifyImageConfig {
    VerifyImageConfig {
        safename: storage.safename(),
        obj_type,
        image_sha256: storage.image_sha256.clone(),
        ref_count,
    }
}

/// Publish one downloader config per tallied artifact with `RefCount` equal
/// to its wanting holders, and unpublish configs nobody holds any more.
pub(crate) fn sync_downloads(
    publication: &Publication<DownloaderConfig>,
    obj_type: ObjType,
    tally: &RefTally,
    datastores: &SubView<DatastoreConfig>,
) -> Result<(), BusError> {
    for (safename, t) in &tally.entries {
        match publication.get(safename) {
            Some(mut existing) => {
                if existing.ref_count != t.wanted {
                    tracing::debug!(
                        safename,
                        from = existing.ref_count,
                        to = t.wanted,
                        "download refcount"
                    );
                    existing.ref_count = t.wanted;
                    publication.publish(safename, &existing)?;
                }
            }
            None => {
                let datastore = datastores.get(&t.storage.datastore_id.to_string());
                let config = downloader_config(obj_type, &t.storage, datastore.as_ref(), t.wanted);
                tracing::info!(safename, ref_count = t.wanted, "adding downloader config");
                publication.publish(safename, &config)?;
            }
        }
    }
    for safename in publication.get_all().into_keys() {
        if !tally.entries.contains_key(&safename) {
            tracing::info!(safename, "removing downloader config");
            publication.unpublish(&safename)?;
        }
    }
    Ok(())
}

/// Same as [`sync_downloads`] for verifier configs; every holder counts.
pub(crate) fn sync_verifications(
    publication: &Publication<VerifyImageConfig>,
    obj_type: ObjType,
    tally: &RefTally,
) -> Result<(), BusError> {
    for (safename, t) in &tally.entries {
        let config = verifier_config(obj_type, &t.storage, t.holders);
        publication.publish(safename, &config)?;
    }
    for safename in publication.get_all().into_keys() {
        if !tally.entries.contains_key(&safename) {
            tracing::info!(safename, "removing verifier config");
            publication.unpublish(&safename)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "refs_tests.rs"]
mod tests;
