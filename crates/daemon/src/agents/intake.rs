// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config intake: the device's desired state, read from JSON files under
//! `config/` and published for the other agents.
//!
//! ```text
//! config/
//!   app-instances/*.json   AppInstanceConfig
//!   datastores/*.json      DatastoreConfig
//!   base-os/*.json         BaseOsConfig
//!   certs/*.json           CertObjConfig
//!   global.json            GlobalConfig
//!   global-download.json   GlobalDownloadConfig
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use ef_bus::{Bus, BusError, Publication};
use ef_core::{
    AgentName, AppInstanceConfig, BaseOsConfig, BusObject, CertObjConfig, Clock, DatastoreConfig,
    GlobalConfig, GlobalDownloadConfig, GLOBAL_KEY,
};
use tokio_util::sync::CancellationToken;

use crate::agents::AgentDeps;
use crate::config::DaemonConfig;
use crate::error::AgentError;

const AGENT: AgentName = AgentName::Zedagent;

/// One directory of JSON records feeding one publication.
struct DirFeed<T: BusObject> {
    dir: PathBuf,
    publication: Publication<T>,
    /// Key each file produced on the last scan
    seen: BTreeMap<PathBuf, String>,
}

impl<T: BusObject> DirFeed<T> {
    fn new(dir: PathBuf, publication: Publication<T>) -> Self {
        Self { dir, publication, seen: BTreeMap::new() }
    }

    /// Publish every parsable file and unpublish keys whose file is gone.
    /// A file that fails to parse keeps whatever it published before.
    fn scan(&mut self) -> Result<usize, BusError> {
        let mut seen = BTreeMap::new();
        for path in json_files(&self.dir) {
            match read_record::<T>(&path) {
                Ok(item) => {
                    let key = item.key();
                    self.publication.publish(&key, &item)?;
                    seen.insert(path, key);
                }
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "skipping config file");
                    if let Some(key) = self.seen.get(&path) {
                        seen.insert(path, key.clone());
                    }
                }
            }
        }
        let live: BTreeSet<&String> = seen.values().collect();
        for key in self.publication.get_all().into_keys() {
            if !live.contains(&key) {
                tracing::info!(key, kind = T::TYPE_NAME, "config removed");
                self.publication.unpublish(&key)?;
            }
        }
        let count = seen.len();
        self.seen = seen;
        Ok(count)
    }
}

fn json_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot list config directory");
            return Vec::new();
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    files
}

fn read_record<T: BusObject>(path: &Path) -> Result<T, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&text).map_err(|e| e.to_string())
}

/// Publish the singleton in `path`, or `default` when there is no file.
fn scan_singleton<T: BusObject>(
    path: &Path,
    publication: &Publication<T>,
    default: T,
) -> Result<(), BusError> {
    let item = if path.exists() {
        match read_record::<T>(path) {
            Ok(item) => item,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "skipping config file");
                return Ok(());
            }
        }
    } else {
        default
    };
    publication.publish(GLOBAL_KEY, &item)
}

/// Every config collection intake owns.
pub struct Intake {
    root: PathBuf,
    defaults: DaemonConfig,
    apps: DirFeed<AppInstanceConfig>,
    datastores: DirFeed<DatastoreConfig>,
    base_os: DirFeed<BaseOsConfig>,
    certs: DirFeed<CertObjConfig>,
    global: Publication<GlobalConfig>,
    global_download: Publication<GlobalDownloadConfig>,
}

impl Intake {
    pub fn new(bus: &Bus, root: PathBuf, defaults: DaemonConfig) -> Result<Self, BusError> {
        Ok(Self {
            apps: DirFeed::new(root.join("app-instances"), bus.publication(AGENT, None)?),
            datastores: DirFeed::new(root.join("datastores"), bus.publication(AGENT, None)?),
            base_os: DirFeed::new(root.join("base-os"), bus.publication(AGENT, None)?),
            certs: DirFeed::new(root.join("certs"), bus.publication(AGENT, None)?),
            global: bus.publication(AGENT, None)?,
            global_download: bus.publication(AGENT, None)?,
            root,
            defaults,
        })
    }

    /// One full pass over the config directory.
    ///
    /// Datastores go first so that instances referencing them do not start
    /// out flagged as missing a datastore.
    pub fn scan(&mut self) -> Result<(), BusError> {
        scan_singleton(&self.root.join("global.json"), &self.global, self.defaults.global.clone())?;
        scan_singleton(
            &self.root.join("global-download.json"),
            &self.global_download,
            GlobalDownloadConfig { max_space_kb: self.defaults.max_space_kb },
        )?;
        let datastores = self.datastores.scan()?;
        let apps = self.apps.scan()?;
        let base_os = self.base_os.scan()?;
        let certs = self.certs.scan()?;
        tracing::debug!(datastores, apps, base_os, certs, "config scanned");
        Ok(())
    }

    /// Announce that every collection holds the device's full config.
    pub fn signal_restarted(&self) {
        self.datastores.publication.signal_restarted();
        self.apps.publication.signal_restarted();
        self.base_os.publication.signal_restarted();
        self.certs.publication.signal_restarted();
        self.global.signal_restarted();
        self.global_download.signal_restarted();
    }

    fn clear_restarted(&self) {
        self.datastores.publication.clear_restarted();
        self.apps.publication.clear_restarted();
        self.base_os.publication.clear_restarted();
        self.certs.publication.clear_restarted();
        self.global.clear_restarted();
        self.global_download.clear_restarted();
    }
}

/// Poll the config directory until cancelled, signalling restarted once
/// the first scan has published everything.
pub async fn run<C: Clock>(
    deps: AgentDeps<C>,
    defaults: DaemonConfig,
    cancel: CancellationToken,
) -> Result<(), AgentError> {
    let heartbeat = deps.heartbeat(AGENT);
    let mut intake = Intake::new(&deps.bus, deps.paths.config_dir(), defaults)?;
    intake.clear_restarted();
    intake.scan()?;
    intake.signal_restarted();
    tracing::info!(dir = %deps.paths.config_dir().display(), "config intake restarted");

    let mut ticker = heartbeat.ticker();
    let mut poll = tokio::time::interval(crate::env::intake_poll_interval());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = poll.tick() => intake.scan()?,
            _ = ticker.tick() => heartbeat.touch(),
        }
    }
}

#[cfg(test)]
#[path = "intake_tests.rs"]
mod tests;
