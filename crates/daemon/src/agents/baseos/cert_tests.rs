// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::super::test_helpers::*;
use super::*;
use ef_core::DownloaderStatus;

#[test]
fn downloaded_cert_is_copied_into_certs() {
    let mut f = fixture();
    f.apply_cert(&cert("1"));
    let download = f.ctx.cert_downloads.get("root.pem").unwrap();
    assert_eq!(download.ref_count, 1);
    assert_eq!(download.obj_type, ObjType::Cert);
    assert!(f.ctx.verifications.is_empty(), "certs are not verified");

    f.settle();
    let status = f.cert_status();
    assert_eq!(status.state, SwState::Delivered);
    let installed = f.paths().certs_dir().join("root.pem");
    assert_eq!(status.storage_status_list[0].active_file, installed.display().to_string());
    assert_eq!(std::fs::read(&installed).unwrap(), b"-----BEGIN CERTIFICATE-----");
    assert_eq!(
        f.ctx.cert_downloads.get("root.pem").unwrap().ref_count,
        1,
        "download kept for the cert"
    );
}

#[test]
fn download_error_is_surfaced() {
    let mut f = fixture();
    f.apply_cert(&cert("1"));
    let config = f.ctx.cert_downloads.get("root.pem").unwrap();
    let mut failed = DownloaderStatus::from_config(&config, 0);
    failed.record_error("connection refused", 77);
    f.cert_download_status.publish("root.pem", &failed).unwrap();
    f.pump();

    let status = f.cert_status();
    assert_eq!(status.error, "connection refused");
    assert_eq!(status.error_time_ms, 77);
    assert_eq!(status.state, SwState::Initial);
}

#[test]
fn same_version_is_ignored() {
    let mut f = fixture();
    f.apply_cert(&cert("1"));
    let mut same = cert("1");
    same.storage_config_list.clear();
    f.apply_cert(&same);

    assert_eq!(f.cert_status().storage_status_list.len(), 1);
    assert!(f.ctx.cert_downloads.get("root.pem").is_some());
}

#[test]
fn new_version_replaces_the_cert_files() {
    let mut f = fixture();
    f.apply_cert(&cert("1"));
    f.settle();
    let installed = f.paths().certs_dir().join("root.pem");
    assert!(installed.exists());

    let mut next = cert("2");
    next.storage_config_list =
        vec![ef_core::test_support::storage(datastore_uuid(), "file:///certs/next.pem", "", 0)];
    f.apply_cert(&next);
    assert!(!installed.exists());
    assert!(f.ctx.cert_downloads.get("root.pem").is_none());
    assert!(f.ctx.cert_downloads.get("next.pem").is_some());
    assert_eq!(f.cert_status().uuid_and_version.version, "2");
}

#[test]
fn delete_removes_cert_and_download() {
    let mut f = fixture();
    f.apply_cert(&cert("1"));
    f.settle();

    f.certs.unpublish(&cert("1").uuid_and_version.key()).unwrap();
    f.pump();
    assert!(f.ctx.cert_statuses.is_empty());
    assert!(f.ctx.cert_downloads.is_empty());
    assert!(!f.paths().certs_dir().join("root.pem").exists());
}
