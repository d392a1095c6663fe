// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent identities used as the owner component of a collection.

use serde::{Deserialize, Serialize};

/// Every agent that owns publications on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentName {
    /// Configuration intake
    Zedagent,
    /// Device network status
    Nim,
    Downloader,
    Verifier,
    /// Application instance lifecycle
    Zedmanager,
    /// Base OS and certificate lifecycle
    Baseosmgr,
    Identitymgr,
    Zedrouter,
    Domainmgr,
}

impl AgentName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zedagent => "zedagent",
            Self::Nim => "nim",
            Self::Downloader => "downloader",
            Self::Verifier => "verifier",
            Self::Zedmanager => "zedmanager",
            Self::Baseosmgr => "baseosmgr",
            Self::Identitymgr => "identitymgr",
            Self::Zedrouter => "zedrouter",
            Self::Domainmgr => "domainmgr",
        }
    }
}

impl std::fmt::Display for AgentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
