// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Management-port addresses published by the network status agent.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::object::GLOBAL_KEY;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkPortStatus {
    pub if_name: String,
    /// Free (unmetered) management port
    pub free: bool,
    pub addrs: Vec<IpAddr>,
}

/// Usable local addresses per management port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceNetworkStatus {
    /// Set while a candidate port configuration is under test
    pub testing: bool,
    pub ports: Vec<NetworkPortStatus>,
}

crate::bus_object!(DeviceNetworkStatus, "DeviceNetworkStatus", |_s| GLOBAL_KEY.to_string());

fn is_link_local(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}

impl DeviceNetworkStatus {
    /// Addresses on free ports first, then the rest, excluding link-local.
    fn any_no_link_local(&self) -> impl Iterator<Item = (&str, IpAddr)> + '_ {
        let free = self.ports.iter().filter(|p| p.free);
        let paid = self.ports.iter().filter(|p| !p.free);
        free.chain(paid)
            .flat_map(|p| p.addrs.iter().map(move |a| (p.if_name.as_str(), *a)))
            .filter(|(_, a)| !is_link_local(a))
    }

    fn free_no_link_local(&self) -> impl Iterator<Item = (&str, IpAddr)> + '_ {
        self.ports
            .iter()
            .filter(|p| p.free)
            .flat_map(|p| p.addrs.iter().map(move |a| (p.if_name.as_str(), *a)))
            .filter(|(_, a)| !is_link_local(a))
    }

    /// Zero means outbound connections are not possible yet.
    pub fn count_local_addr_any_no_link_local(&self) -> usize {
        self.any_no_link_local().count()
    }

    pub fn count_local_addr_free_no_link_local(&self) -> usize {
        self.free_no_link_local().count()
    }

    pub fn local_addr_any_no_link_local(&self, index: usize) -> Option<IpAddr> {
        self.any_no_link_local().nth(index).map(|(_, a)| a)
    }

    pub fn local_addr_free_no_link_local(&self, index: usize) -> Option<IpAddr> {
        self.free_no_link_local().nth(index).map(|(_, a)| a)
    }

    pub fn mgmt_port_for(&self, addr: IpAddr) -> Option<&str> {
        self.ports.iter().find(|p| p.addrs.contains(&addr)).map(|p| p.if_name.as_str())
    }
}

#[cfg(test)]
#[path = "network_tests.rs"]
mod tests;
