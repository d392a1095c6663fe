// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for workspace specs.

use std::path::PathBuf;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tempfile::TempDir;

pub use ef_bus::Publication;
pub use ef_core::test_support::{app_config, file_datastore, storage};
pub use ef_core::{
    safename, AgentName, AppInstanceStatus, BaseOsConfig, BaseOsStatus, DownloaderStatus,
    GlobalDownloadStatus, ObjType, PartitionState, SwState, UuidAndVersion, ZbootStatus, GLOBAL_KEY,
};
pub use ef_daemon::{startup, Config, DaemonState};
pub use uuid::Uuid;

const ONE_PORT: &str = r#"
[[ports]]
if_name = "eth0"
free = true
addrs = ["10.0.0.2"]
"#;

/// A device state directory with a file datastore next to it.
pub struct Device {
    dir: TempDir,
    pub config: Config,
}

impl Device {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::for_dir(dir.path().join("state"));
        std::fs::create_dir_all(&config.state_dir).unwrap();
        std::fs::write(&config.config_path, ONE_PORT).unwrap();
        Self { dir, config }
    }

    pub fn images_dir(&self) -> PathBuf {
        self.dir.path().join("images")
    }

    /// Put an image where the file datastore serves it. Returns its sha256.
    pub fn add_image(&self, name: &str, bytes: &[u8]) -> String {
        std::fs::create_dir_all(self.images_dir()).unwrap();
        std::fs::write(self.images_dir().join(name), bytes).unwrap();
        Sha256::digest(bytes).iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn add_datastore(&self, uuid: Uuid) {
        let mut datastore = file_datastore(uuid);
        datastore.dpath = self.images_dir().display().to_string();
        self.write_config("datastores", &uuid.to_string(), &datastore);
    }

    /// Drop `<kind>/<name>.json` into the intake directory.
    pub fn write_config(&self, kind: &str, name: &str, value: &impl serde::Serialize) {
        let dir = self.config.paths().config_dir().join(kind);
        std::fs::create_dir_all(&dir).unwrap();
        let json = serde_json::to_string_pretty(value).unwrap();
        std::fs::write(dir.join(format!("{name}.json")), json).unwrap();
    }

    pub fn remove_config(&self, kind: &str, name: &str) {
        let path = self.config.paths().config_dir().join(kind).join(format!("{name}.json"));
        std::fs::remove_file(path).unwrap();
    }

    pub async fn start(&self) -> DaemonState {
        startup(&self.config).await.unwrap()
    }
}

/// Poll `check` until it holds, failing after thirty seconds.
pub async fn wait_for(what: &str, check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

pub fn app_statuses(daemon: &DaemonState) -> Publication<AppInstanceStatus> {
    daemon.bus.publication(AgentName::Zedmanager, None).unwrap()
}

pub fn app_downloads(daemon: &DaemonState) -> Publication<DownloaderStatus> {
    daemon.bus.publication(AgentName::Downloader, Some(ObjType::AppImg)).unwrap()
}

pub fn download_quota(daemon: &DaemonState) -> GlobalDownloadStatus {
    daemon
        .bus
        .publication::<GlobalDownloadStatus>(AgentName::Downloader, None)
        .unwrap()
        .get(GLOBAL_KEY)
        .unwrap_or_default()
}

pub fn base_os_statuses(daemon: &DaemonState) -> Publication<BaseOsStatus> {
    daemon.bus.publication(AgentName::Baseosmgr, None).unwrap()
}

pub fn partitions(daemon: &DaemonState) -> Publication<ZbootStatus> {
    daemon.bus.persistent_publication(AgentName::Baseosmgr, None).unwrap()
}
