// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::agents::test_util::{deps, eventually};
use ef_bus::Bus;
use ef_core::{EidDetails, FakeClock, UuidAndVersion};
use uuid::Uuid;

fn identity() -> UuidAndVersion {
    UuidAndVersion::new(Uuid::from_u128(5), "1")
}

#[test]
fn statuses_mirror_activation() {
    let network = AppNetworkConfig {
        uuid_and_version: identity(),
        display_name: "web".to_string(),
        activate: true,
        overlay_network_list: Vec::new(),
        underlay_network_list: Vec::new(),
    };
    assert!(network.acknowledge().activated);

    let domain = DomainConfig {
        uuid_and_version: identity(),
        display_name: "web".to_string(),
        activate: false,
        vcpus: 1,
        memory_kb: 1024,
        disk_paths: Vec::new(),
        io_adapter_list: Vec::new(),
    };
    let status = domain.acknowledge();
    assert!(!status.activated);
    assert_eq!(status.state, SwState::Delivered);
    assert_eq!(status.key(), domain.key());
}

#[test]
fn eid_status_keeps_the_config_key() {
    let eid = EidConfig {
        uuid_and_version: identity(),
        display_name: "web".to_string(),
        details: EidDetails { iid: 3, eid: "fd00::3".to_string(), ..EidDetails::default() },
    };
    assert_eq!(eid.acknowledge().key(), eid.key());
}

#[tokio::test]
async fn answers_configs_and_relays_restarted() {
    let dir = tempfile::tempdir().unwrap();
    let bus = Bus::in_memory();
    let clock = FakeClock::new();
    let configs = bus.publication::<DomainConfig>(AgentName::Zedmanager, None).unwrap();
    let statuses = bus.publication::<DomainStatus>(AgentName::Domainmgr, None).unwrap();
    let cancel = CancellationToken::new();
    let deps = deps(&dir, &bus, &clock);
    let handle = tokio::spawn(run::<DomainConfig, _>(deps, AgentName::Zedmanager, cancel.clone()));

    let config = DomainConfig {
        uuid_and_version: identity(),
        display_name: "web".to_string(),
        activate: true,
        vcpus: 1,
        memory_kb: 1024,
        disk_paths: vec!["/disk".to_string()],
        io_adapter_list: Vec::new(),
    };
    configs.publish(&config.key(), &config).unwrap();
    eventually("domain status", || statuses.get(&config.key()).is_some_and(|s| s.activated)).await;
    assert!(!statuses.restarted());

    configs.signal_restarted();
    eventually("restarted", || statuses.restarted()).await;

    configs.unpublish(&config.key()).unwrap();
    eventually("status removal", || statuses.is_empty()).await;

    cancel.cancel();
    handle.await.unwrap().unwrap();
}
