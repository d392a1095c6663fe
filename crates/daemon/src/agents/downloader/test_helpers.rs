// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use ef_bus::Bus;
use ef_core::test_support::network_ready;
use ef_core::{AgentName, DownloaderStatus, FakeClock, ObjType, Paths};
use tempfile::TempDir;

use super::transfer::FakeTransfer;
use super::worker::Worker;
use super::{dispatch_key, Shared};
use crate::agents::AgentDeps;

pub(crate) const SHA_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub(crate) const SHA_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
pub(crate) const URL_A: &str = "file:///images/a.qcow2";

pub(crate) struct Harness {
    pub dir: TempDir,
    pub bus: Bus,
    pub clock: FakeClock,
    pub fake: FakeTransfer,
    pub shared: Arc<Shared<FakeClock>>,
}

/// Shared downloader state over an in-memory bus, with a ready network.
pub(crate) fn harness(max_kb: u64) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let bus = Bus::in_memory();
    let clock = FakeClock::new();
    let fake = FakeTransfer::new();
    let deps = AgentDeps::new(bus.clone(), Paths::new(dir.path()), clock.clone());
    let quota_status = bus.publication(AgentName::Downloader, None).unwrap();
    let shared = Arc::new(Shared::new(&deps, Arc::new(fake.clone()), quota_status).unwrap());
    shared.quota.set_max(max_kb);
    *shared.network.write() = network_ready();
    Harness { dir, bus, clock, fake, shared }
}

impl Harness {
    pub fn worker(&self, obj_type: ObjType, safename: &str) -> Worker<FakeClock> {
        Worker::new(Arc::clone(&self.shared), dispatch_key(obj_type, safename))
    }

    pub fn published(&self, obj_type: ObjType, safename: &str) -> Option<DownloaderStatus> {
        self.shared.statuses.for_type(obj_type).get(safename)
    }

    pub fn paths(&self) -> Paths {
        Paths::new(self.dir.path())
    }
}
