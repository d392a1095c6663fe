// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::agents::downloader::test_helpers::harness;
use crate::agents::test_util::{deps, eventually, settle};
use ef_bus::Bus;
use ef_core::test_support::{downloader_config, network_ready};
use ef_core::{FakeClock, SwState};
use tokio::task::JoinHandle;

const SHA: &str = "cccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc";

struct Running {
    _dir: tempfile::TempDir,
    bus: Bus,
    paths: Paths,
    fake: FakeTransfer,
    cancel: CancellationToken,
    handle: JoinHandle<Result<(), AgentError>>,
}

fn start(before: impl FnOnce(&Bus, &Paths)) -> Running {
    let dir = tempfile::tempdir().unwrap();
    let bus = Bus::in_memory();
    let clock = FakeClock::new();
    let deps = deps(&dir, &bus, &clock);
    let paths = deps.paths.clone();
    before(&bus, &paths);
    let fake = FakeTransfer::new();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run(deps, Arc::new(fake.clone()), cancel.clone()));
    Running { _dir: dir, bus, paths, fake, cancel, handle }
}

impl Running {
    fn make_ready(&self, network: DeviceNetworkStatus) {
        let quota =
            self.bus.publication::<GlobalDownloadConfig>(AgentName::Zedagent, None).unwrap();
        quota.publish(GLOBAL_KEY, &GlobalDownloadConfig { max_space_kb: 1_000_000 }).unwrap();
        let dns = self.bus.publication::<DeviceNetworkStatus>(AgentName::Nim, None).unwrap();
        dns.publish(GLOBAL_KEY, &network).unwrap();
    }

    fn configs(&self) -> Publication<DownloaderConfig> {
        self.bus.publication(AgentName::Zedmanager, Some(ObjType::AppImg)).unwrap()
    }

    fn statuses(&self) -> Publication<DownloaderStatus> {
        self.bus.publication(AGENT, Some(ObjType::AppImg)).unwrap()
    }

    fn quota(&self) -> GlobalDownloadStatus {
        self.bus
            .publication::<GlobalDownloadStatus>(AGENT, None)
            .unwrap()
            .get(GLOBAL_KEY)
            .unwrap_or_default()
    }

    async fn stop(self) {
        self.cancel.cancel();
        self.handle.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn status_collections_signal_restarted_at_start() {
    let agent = start(|_, _| {});
    let statuses = agent.statuses();
    eventually("restarted", || statuses.restarted()).await;
    agent.stop().await;
}

#[tokio::test]
async fn downloads_only_once_network_and_quota_are_known() {
    let agent = start(|_, _| {});
    let cfg = downloader_config(ObjType::AppImg, "file:///img/app.qcow2", SHA, 4096, 1);
    agent.configs().publish(&cfg.safename, &cfg).unwrap();

    let mut testing = network_ready();
    testing.testing = true;
    agent.make_ready(testing);
    settle().await;
    assert!(agent.statuses().is_empty());

    agent.make_ready(network_ready());
    let statuses = agent.statuses();
    eventually("download", || {
        statuses.get(&cfg.safename).is_some_and(|s| s.state == SwState::Downloaded)
    })
    .await;
    assert_eq!(agent.quota().used_space_kb, 4);
    assert_eq!(agent.fake.calls_for(&cfg.download_url), 1);

    agent.configs().unpublish(&cfg.safename).unwrap();
    eventually("unpublish", || statuses.get(&cfg.safename).is_none()).await;
    assert_eq!(agent.quota().used_space_kb, 0);
    assert!(!agent.paths.pending_file(ObjType::AppImg, SHA, &cfg.safename).exists());
    agent.stop().await;
}

#[test]
fn network_status_filters() {
    let h = harness(1_000);
    *h.shared.network.write() = DeviceNetworkStatus::default();
    let mut ctx = DownloaderContext {
        shared: Arc::clone(&h.shared),
        dispatch: WorkerDispatch::new(),
        configs: Vec::new(),
        gc_period_changed: false,
    };
    assert!(!ctx.ready());

    handle_dns_modify(&mut ctx, "eth1", &network_ready()).unwrap();
    assert!(!ctx.ready());

    let mut testing = network_ready();
    testing.testing = true;
    handle_dns_modify(&mut ctx, GLOBAL_KEY, &testing).unwrap();
    assert!(!ctx.ready());

    handle_dns_modify(&mut ctx, GLOBAL_KEY, &network_ready()).unwrap();
    assert!(ctx.ready());

    handle_dns_delete(&mut ctx, GLOBAL_KEY, &network_ready()).unwrap();
    assert!(!ctx.ready());
}

#[test]
fn global_config_change_flags_gc_period() {
    let h = harness(1_000);
    let mut ctx = DownloaderContext {
        shared: Arc::clone(&h.shared),
        dispatch: WorkerDispatch::new(),
        configs: Vec::new(),
        gc_period_changed: false,
    };
    let mut config = GlobalConfig::default();
    handle_global_config(&mut ctx, GLOBAL_KEY, &config).unwrap();
    assert!(!ctx.gc_period_changed);

    config.download_retry_time_secs = 60;
    handle_global_config(&mut ctx, GLOBAL_KEY, &config).unwrap();
    assert!(!ctx.gc_period_changed);
    assert_eq!(h.shared.settings.borrow().retry_time, Duration::from_secs(60));

    config.download_gc_time_secs = 60;
    handle_global_config(&mut ctx, GLOBAL_KEY, &config).unwrap();
    assert!(ctx.gc_period_changed);
}

#[tokio::test]
async fn orphaned_status_is_removed_after_sync() {
    let cfg = downloader_config(ObjType::AppImg, "file:///img/gone.qcow2", SHA, 2048, 1);
    let orphan = cfg.clone();
    let agent = start(move |bus, paths| {
        let path = paths.pending_file(ObjType::AppImg, SHA, &orphan.safename);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, vec![0u8; 2048]).unwrap();
        let mut status = DownloaderStatus::from_config(&orphan, 0);
        status.state = SwState::Downloaded;
        status.size = 2048;
        let statuses = bus.publication::<DownloaderStatus>(AGENT, Some(ObjType::AppImg)).unwrap();
        statuses.publish(&orphan.safename, &status).unwrap();
    });

    agent.make_ready(network_ready());
    let statuses = agent.statuses();
    eventually("orphan removal", || statuses.is_empty()).await;
    assert!(!agent.paths.pending_file(ObjType::AppImg, SHA, &cfg.safename).exists());
    assert_eq!(agent.quota().used_space_kb, 0);
    agent.stop().await;
}

#[tokio::test]
async fn cancel_during_gating_returns_cleanly() {
    let agent = start(|_, _| {});
    settle().await;
    agent.stop().await;
}

#[yare::parameterized(
    floor = { 5, 1 },
    tenth = { 600, 60 },
)]
fn gc_period_is_a_tenth_of_gc_time(gc_secs: u64, period_secs: u64) {
    let settings =
        Settings { gc_time: Duration::from_secs(gc_secs), retry_time: Duration::from_secs(600) };
    assert_eq!(settings.gc_period(), Duration::from_secs(period_secs));
}
