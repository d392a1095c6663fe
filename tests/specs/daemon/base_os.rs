// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Base OS specs
//!
//! A new base OS image is written to the spare partition, booted on the
//! next daemon start, and kept once its test completes.

use crate::prelude::*;

const OS_IMAGE: &[u8] = b"root filesystem for 2.0";

fn base_os(device: &Device, activate: bool, test_complete: bool) -> Uuid {
    let datastore = Uuid::from_u128(0xd5);
    device.add_datastore(datastore);
    let sha = device.add_image("os-2.0.img", OS_IMAGE);
    let uuid = Uuid::from_u128(0xb0);
    let config = BaseOsConfig {
        uuid_and_version: UuidAndVersion::new(uuid, "1"),
        base_os_version: "2.0".to_string(),
        storage_config_list: vec![storage(datastore, "os-2.0.img", &sha, OS_IMAGE.len() as u64)],
        activate,
        test_complete,
    };
    device.write_config("base-os", "os", &config);
    uuid
}

#[tokio::test(flavor = "multi_thread")]
async fn new_image_is_written_to_the_spare_partition() {
    let device = Device::new();
    let uuid = base_os(&device, true, false);
    let mut daemon = device.start().await;

    let statuses = base_os_statuses(&daemon);
    wait_for("image installed", || {
        statuses.get(&uuid.to_string()).is_some_and(|s| s.state == SwState::Installed)
    })
    .await;
    let status = statuses.get(&uuid.to_string()).unwrap();
    assert_eq!(status.partition_label, "IMGB");
    assert!(!status.activated, "not booted yet");

    let written = std::fs::read(daemon.paths.partition_file("IMGB")).unwrap();
    similar_asserts::assert_eq!(written, OS_IMAGE.to_vec());
    let spare = partitions(&daemon).get("IMGB").unwrap();
    assert_eq!(spare.partition_state, PartitionState::Updating);
    assert_eq!(spare.short_version, "2.0");

    daemon.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn inactive_image_is_fetched_but_not_installed() {
    let device = Device::new();
    let uuid = base_os(&device, false, false);
    let mut daemon = device.start().await;

    let statuses = base_os_statuses(&daemon);
    wait_for("image delivered", || {
        statuses.get(&uuid.to_string()).is_some_and(|s| s.state == SwState::Delivered)
    })
    .await;
    assert!(!daemon.paths.partition_file("IMGB").exists());
    assert_eq!(partitions(&daemon).get("IMGB").unwrap().partition_state, PartitionState::Unused);

    daemon.shutdown().await.unwrap();
}
