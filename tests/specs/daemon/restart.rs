// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon restart specs
//!
//! What survives a daemon restart: the partition table and the purge and
//! restart counters. Everything else is rebuilt from config.

use std::time::Duration;

use ef_bus::{Change, HandlerResult, Subscription};
use ef_core::AppInstanceConfig;

use crate::prelude::*;

const OS_IMAGE: &[u8] = b"root filesystem for 2.0";
const APP_IMAGE: &[u8] = b"application disk";

fn write_base_os(device: &Device, test_complete: bool) -> Uuid {
    let datastore = Uuid::from_u128(0xd5);
    device.add_datastore(datastore);
    let sha = device.add_image("os-2.0.img", OS_IMAGE);
    let uuid = Uuid::from_u128(0xb0);
    let config = BaseOsConfig {
        uuid_and_version: UuidAndVersion::new(uuid, "1"),
        base_os_version: "2.0".to_string(),
        storage_config_list: vec![storage(datastore, "os-2.0.img", &sha, OS_IMAGE.len() as u64)],
        activate: true,
        test_complete,
    };
    device.write_config("base-os", "os", &config);
    uuid
}

#[tokio::test(flavor = "multi_thread")]
async fn installed_image_boots_on_next_start_and_is_kept_after_test() {
    let device = Device::new();
    let uuid = write_base_os(&device, false);

    let mut first = device.start().await;
    let statuses = base_os_statuses(&first);
    wait_for("image installed", || {
        statuses.get(&uuid.to_string()).is_some_and(|s| s.state == SwState::Installed)
    })
    .await;
    first.shutdown().await.unwrap();
    drop(first);

    let mut second = device.start().await;
    let statuses = base_os_statuses(&second);
    wait_for("booted into the new image", || {
        statuses.get(&uuid.to_string()).is_some_and(|s| s.activated)
    })
    .await;
    let status = statuses.get(&uuid.to_string()).unwrap();
    assert_eq!(status.partition_label, "IMGB");
    assert!(!status.test_complete);
    let table = partitions(&second);
    assert_eq!(table.get("IMGB").unwrap().partition_state, PartitionState::Inprogress);
    assert!(table.get("IMGB").unwrap().current_partition);

    write_base_os(&device, true);
    wait_for("test complete", || {
        statuses.get(&uuid.to_string()).is_some_and(|s| s.test_complete)
    })
    .await;
    assert_eq!(table.get("IMGB").unwrap().partition_state, PartitionState::Active);
    assert_eq!(table.get("IMGA").unwrap().partition_state, PartitionState::Unused);

    second.shutdown().await.unwrap();
}

fn record(seen: &mut Vec<SwState>, _key: &str, status: &AppInstanceStatus) -> HandlerResult {
    seen.push(status.state);
    Ok(())
}

/// Follow an app's status until it is installed, returning every state seen.
async fn states_until_installed(daemon: &DaemonState, key: &str) -> Vec<SwState> {
    let mut sub: Subscription<AppInstanceStatus, Vec<SwState>> =
        daemon.bus.subscribe(AgentName::Zedmanager, None).unwrap().on_modify(record);
    sub.activate();
    let mut seen = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while !sub.view().get(key).is_some_and(|s| s.state == SwState::Installed) {
        let change: Change<AppInstanceStatus> = tokio::time::timeout_at(deadline, sub.recv())
            .await
            .expect("timed out waiting for install");
        sub.process_change(change, &mut seen).unwrap();
    }
    seen
}

fn app(device: &Device, purge_counter: u32) -> AppInstanceConfig {
    let datastore = Uuid::from_u128(0xd5);
    device.add_datastore(datastore);
    let sha = device.add_image("app.img", APP_IMAGE);
    let mut config = app_config(
        Uuid::from_u128(0xa1),
        vec![storage(datastore, "app.img", &sha, APP_IMAGE.len() as u64)],
    );
    config.activate = true;
    config.purge_cmd.counter = purge_counter;
    device.write_config("app-instances", "web", &config);
    config
}

#[tokio::test(flavor = "multi_thread")]
async fn unchanged_purge_counter_is_not_replayed_after_restart() {
    let device = Device::new();
    let config = app(&device, 3);
    let key = config.uuid_and_version.key();

    let mut first = device.start().await;
    let seen = states_until_installed(&first, &key).await;
    assert!(!seen.contains(&SwState::Purging), "states: {seen:?}");
    first.shutdown().await.unwrap();
    drop(first);

    let mut second = device.start().await;
    let seen = states_until_installed(&second, &key).await;
    assert!(!seen.contains(&SwState::Purging), "states: {seen:?}");
    second.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn purge_requested_while_down_runs_on_next_start() {
    let device = Device::new();
    let config = app(&device, 0);
    let key = config.uuid_and_version.key();

    let mut first = device.start().await;
    states_until_installed(&first, &key).await;
    first.shutdown().await.unwrap();
    drop(first);

    app(&device, 1);
    let mut second = device.start().await;
    let seen = states_until_installed(&second, &key).await;
    assert!(seen.contains(&SwState::Purging), "states: {seen:?}");
    assert_eq!(app_statuses(&second).get(&key).unwrap().purge_cmd.counter, 1);
    second.shutdown().await.unwrap();
}
