// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Helpers for tests that run whole agents on a live runtime.

use std::time::Duration;

use ef_bus::Bus;
use ef_core::{FakeClock, Paths};
use tempfile::TempDir;

use super::AgentDeps;

/// Poll `check` until it holds, failing the test after five seconds.
pub(crate) async fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Give a running agent time to act on something it should ignore.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

pub(crate) fn deps(dir: &TempDir, bus: &Bus, clock: &FakeClock) -> AgentDeps<FakeClock> {
    AgentDeps::new(bus.clone(), Paths::new(dir.path()), clock.clone())
        .with_heartbeat_period(Duration::from_secs(60))
}
