// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Liveness touch files, one per agent.

use std::path::PathBuf;
use std::time::Duration;

use ef_core::{AgentName, Clock, Paths};
use tokio::time::{Interval, MissedTickBehavior};

/// Writes the current epoch-ms into `run/<agent>.touch`.
///
/// Agents tick it from their main select loop, including while waiting on
/// startup gates, so a stalled loop shows up as a stale file.
pub struct Heartbeat<C: Clock> {
    agent: AgentName,
    path: PathBuf,
    period: Duration,
    clock: C,
}

impl<C: Clock> Heartbeat<C> {
    pub fn new(paths: &Paths, agent: AgentName, period: Duration, clock: C) -> Self {
        Self { agent, path: paths.touch_file(agent), period, clock }
    }

    pub fn ticker(&self) -> Interval {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }

    /// Failures are logged; a missing touch is not worth stopping an agent.
    pub fn touch(&self) {
        let result = match self.path.parent() {
            Some(dir) => std::fs::create_dir_all(dir),
            None => Ok(()),
        }
        .and_then(|()| std::fs::write(&self.path, self.clock.epoch_ms().to_string()));
        if let Err(e) = result {
            tracing::warn!(
                agent = %self.agent,
                path = %self.path.display(),
                error = %e,
                "heartbeat touch failed"
            );
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
