// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// One item on a subscription's ordered delivery channel.
///
/// Restart and synchronization markers travel in-band, interleaved with
/// ordinary object changes.
#[derive(Debug, Clone, PartialEq)]
pub enum Change<T> {
    Modify { key: String, item: T },
    Delete { key: String },
    /// Publisher finished its boot-time publish burst
    Restarted,
    /// Initial snapshot fully enqueued ahead of this marker
    Synchronized,
}

impl<T> Change<T> {
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Modify { key, .. } | Self::Delete { key } => Some(key),
            Self::Restarted | Self::Synchronized => None,
        }
    }
}
