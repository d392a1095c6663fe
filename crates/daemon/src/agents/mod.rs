// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agents. Each one is an async run loop over its own context struct,
//! talking to the others only through the bus.

pub mod appinst;
pub mod baseos;
pub mod downloader;
pub mod intake;
pub mod loopback;
pub mod nim;
pub(crate) mod refs;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_util;

use std::time::Duration;

use ef_bus::Bus;
use ef_core::{AgentName, Clock, Paths};

use crate::heartbeat::Heartbeat;

/// What every agent is started with.
#[derive(Clone)]
pub struct AgentDeps<C: Clock> {
    pub bus: Bus,
    pub paths: Paths,
    pub clock: C,
    pub heartbeat_period: Duration,
}

impl<C: Clock> AgentDeps<C> {
    pub fn new(bus: Bus, paths: Paths, clock: C) -> Self {
        Self { bus, paths, clock, heartbeat_period: crate::env::heartbeat_interval() }
    }

    pub fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    pub fn heartbeat(&self, agent: AgentName) -> Heartbeat<C> {
        Heartbeat::new(&self.paths, agent, self.heartbeat_period, self.clock.clone())
    }
}
