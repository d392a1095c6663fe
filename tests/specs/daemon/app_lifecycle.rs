// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! App instance specs
//!
//! Config files dropped into the intake directory drive an app instance
//! through download, verification and activation.

use ef_bus::{HandlerResult, Subscription};

use crate::prelude::*;

const MIB: u64 = 1_048_576;

fn image() -> Vec<u8> {
    (0..MIB).map(|i| (i % 251) as u8).collect()
}

struct App {
    uuid: Uuid,
    sha: String,
}

impl App {
    fn key(&self) -> String {
        self.uuid.to_string()
    }

    fn safename(&self) -> String {
        safename("app.img", &self.sha)
    }
}

/// One app with a single 1 MiB disk served by a file datastore.
fn deploy(device: &Device, activate: bool) -> App {
    let datastore = Uuid::from_u128(0xd5);
    device.add_datastore(datastore);
    let sha = device.add_image("app.img", &image());
    let uuid = Uuid::from_u128(0xa1);
    let mut config = app_config(uuid, vec![storage(datastore, "app.img", &sha, MIB)]);
    config.activate = activate;
    device.write_config("app-instances", "web", &config);
    App { uuid, sha }
}

#[tokio::test(flavor = "multi_thread")]
async fn activated_app_is_downloaded_verified_and_installed() {
    let device = Device::new();
    let app = deploy(&device, true);
    let mut daemon = device.start().await;

    let statuses = app_statuses(&daemon);
    wait_for("app installed", || {
        statuses.get(&app.key()).is_some_and(|s| s.state == SwState::Installed && s.activated)
    })
    .await;

    let status = statuses.get(&app.key()).unwrap();
    assert_eq!(status.storage_status_list.len(), 1);
    assert_eq!(status.storage_status_list[0].state, SwState::Delivered);
    assert!(status.error.is_empty(), "unexpected error: {}", status.error);

    let verified = daemon.paths.verified_file(ObjType::AppImg, &app.sha, &app.safename());
    similar_asserts::assert_eq!(std::fs::read(verified).unwrap(), image());
    let quota = download_quota(&daemon);
    assert_eq!(quota.used_space_kb, 1024);
    assert_eq!(quota.reserved_space_kb, 0);

    daemon.shutdown().await.unwrap();
}

fn keep(seen: &mut Vec<DownloaderStatus>, _key: &str, status: &DownloaderStatus) -> HandlerResult {
    seen.push(status.clone());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn inactive_app_defers_its_download_until_activated() {
    let device = Device::new();
    let app = deploy(&device, false);
    let mut daemon = device.start().await;

    let downloads = app_downloads(&daemon);
    wait_for("deferred download", || {
        downloads.get(&app.safename()).is_some_and(|s| s.retry_count == 1)
    })
    .await;
    let deferred = downloads.get(&app.safename()).unwrap();
    assert!(deferred.last_err.contains("download deferred"), "last_err: {}", deferred.last_err);
    assert_eq!(deferred.ref_count, 0);
    assert_eq!(deferred.state, SwState::Initial);
    assert!(!daemon.paths.pending_file(ObjType::AppImg, &app.sha, &app.safename()).exists());
    assert_eq!(download_quota(&daemon).used_space_kb, 0);

    let mut history: Subscription<DownloaderStatus, Vec<DownloaderStatus>> =
        daemon.bus.subscribe(AgentName::Downloader, Some(ObjType::AppImg)).unwrap().on_modify(keep);
    history.activate();

    // Activating the instance takes a reference and starts the transfer
    deploy(&device, true);
    let statuses = app_statuses(&daemon);
    wait_for("app installed", || {
        statuses.get(&app.key()).is_some_and(|s| s.state == SwState::Installed)
    })
    .await;

    let mut seen = Vec::new();
    history.drain(&mut seen).unwrap();
    let ours: Vec<&DownloaderStatus> =
        seen.iter().filter(|s| s.safename == app.safename()).collect();
    let started = ours
        .iter()
        .position(|s| s.state == SwState::DownloadStarted)
        .unwrap_or_else(|| panic!("no transfer in {ours:?}"));
    assert_eq!(ours[started].ref_count, 1);
    assert_eq!(ours[started].reserved_space_kb, 1024);
    assert!(
        ours[started..].iter().any(|s| s.state == SwState::Downloaded && s.size == MIB),
        "history: {ours:?}"
    );

    let quota = download_quota(&daemon);
    assert_eq!(quota.used_space_kb, 1024);
    assert_eq!(quota.reserved_space_kb, 0);

    daemon.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn verified_image_is_counted_the_same_after_a_daemon_restart() {
    let device = Device::new();
    let app = deploy(&device, true);

    let mut first = device.start().await;
    let statuses = app_statuses(&first);
    wait_for("app installed", || {
        statuses.get(&app.key()).is_some_and(|s| s.state == SwState::Installed)
    })
    .await;
    assert_eq!(download_quota(&first).used_space_kb, 1024);
    first.shutdown().await.unwrap();
    drop(first);

    let mut second = device.start().await;
    let statuses = app_statuses(&second);
    wait_for("app installed", || {
        statuses.get(&app.key()).is_some_and(|s| s.state == SwState::Installed)
    })
    .await;
    wait_for("verified image counted", || download_quota(&second).used_space_kb == 1024).await;
    assert_eq!(download_quota(&second).reserved_space_kb, 0);
    let download = app_downloads(&second).get(&app.safename()).unwrap();
    assert_eq!(download.state, SwState::Downloaded);

    device.remove_config("app-instances", "web");
    wait_for("space released", || download_quota(&second).used_space_kb == 0).await;
    let verified = second.paths.verified_file(ObjType::AppImg, &app.sha, &app.safename());
    wait_for("verified image removed", || !verified.exists()).await;

    second.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn deleting_the_config_removes_derived_status_and_space() {
    let device = Device::new();
    let app = deploy(&device, true);
    let mut daemon = device.start().await;

    let statuses = app_statuses(&daemon);
    wait_for("app installed", || {
        statuses.get(&app.key()).is_some_and(|s| s.state == SwState::Installed)
    })
    .await;

    device.remove_config("app-instances", "web");
    let downloads = app_downloads(&daemon);
    wait_for("status removed", || statuses.get(&app.key()).is_none()).await;
    wait_for("download released", || downloads.get(&app.safename()).is_none()).await;
    wait_for("space released", || download_quota(&daemon).used_space_kb == 0).await;
    assert_eq!(download_quota(&daemon).reserved_space_kb, 0);

    daemon.shutdown().await.unwrap();
}
