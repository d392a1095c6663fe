// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle enums shared across agents.

use serde::{Deserialize, Serialize};

/// Progress of an artifact or instance.
///
/// The first five variants are strictly forward-progressing and ordered;
/// `Restarting` and `Purging` are excursions layered over the steady state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwState {
    #[default]
    Initial,
    DownloadStarted,
    Downloaded,
    Delivered,
    Installed,
    Restarting,
    Purging,
}

crate::simple_display! {
    SwState {
        Initial => "INITIAL",
        DownloadStarted => "DOWNLOAD_STARTED",
        Downloaded => "DOWNLOADED",
        Delivered => "DELIVERED",
        Installed => "INSTALLED",
        Restarting => "RESTARTING",
        Purging => "PURGING",
    }
}

impl SwState {
    /// The least-advanced state among `states`, or `Initial` when empty.
    pub fn min_of(states: impl IntoIterator<Item = SwState>) -> SwState {
        states.into_iter().min().unwrap_or_default()
    }

    pub fn is_excursion(self) -> bool {
        matches!(self, Self::Restarting | Self::Purging)
    }
}

/// Phase of a restart or purge excursion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inprogress {
    #[default]
    None,
    /// Purge only: fetching the replacement images
    Download,
    BringDown,
    BringUp,
}

crate::simple_display! {
    Inprogress {
        None => "none",
        Download => "download",
        BringDown => "bring_down",
        BringUp => "bring_up",
    }
}

/// Scope tag partitioning one record type into independent collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjType {
    #[serde(rename = "appImg.obj")]
    AppImg,
    #[serde(rename = "baseOs.obj")]
    BaseOs,
    #[serde(rename = "cert.obj")]
    Cert,
}

impl ObjType {
    pub const ALL: [ObjType; 3] = [ObjType::AppImg, ObjType::BaseOs, ObjType::Cert];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AppImg => "appImg.obj",
            Self::BaseOs => "baseOs.obj",
            Self::Cert => "cert.obj",
        }
    }
}

impl std::fmt::Display for ObjType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
