// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Disk-space admission control for downloads, in KB.
//!
//! [`QuotaLedger`] is plain arithmetic; callers share it behind a single
//! mutex and never hold that mutex across I/O.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::GlobalDownloadStatus;

/// Round a byte count up to whole kilobytes.
pub fn round_up_kb(bytes: u64) -> u64 {
    bytes.div_ceil(1024)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotaError {
    #[error("Would exceed remaining space {requested} vs {remaining}")]
    WouldExceed { requested: u64, remaining: u64 },
}

/// Used/reserved accounting against a fixed maximum.
///
/// Invariant: `used + reserved <= max` after every reservation, and
/// `remaining() == max - used - reserved`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLedger {
    max_kb: u64,
    used_kb: u64,
    reserved_kb: u64,
}

impl QuotaLedger {
    pub fn new(max_kb: u64) -> Self {
        Self { max_kb, used_kb: 0, reserved_kb: 0 }
    }

    pub fn max_kb(&self) -> u64 {
        self.max_kb
    }

    pub fn used_kb(&self) -> u64 {
        self.used_kb
    }

    pub fn reserved_kb(&self) -> u64 {
        self.reserved_kb
    }

    pub fn remaining_kb(&self) -> u64 {
        self.max_kb.saturating_sub(self.used_kb + self.reserved_kb)
    }

    /// Seed used space from what is already on disk, capped at the maximum.
    pub fn init(&mut self, measured_kb: u64) {
        self.used_kb = measured_kb.min(self.max_kb);
    }

    /// A smaller maximum blocks new reservations until usage drops.
    pub fn set_max(&mut self, max_kb: u64) {
        self.max_kb = max_kb;
    }

    /// Reserve space for a transfer that has not started yet.
    ///
    /// A request equal to or larger than what remains is refused.
    pub fn try_reserve(&mut self, kb: u64) -> Result<(), QuotaError> {
        let remaining = self.remaining_kb();
        if kb >= remaining {
            return Err(QuotaError::WouldExceed { requested: kb, remaining });
        }
        self.reserved_kb += kb;
        Ok(())
    }

    /// Give back a reservation without using it.
    pub fn release(&mut self, kb: u64) {
        self.reserved_kb = self.reserved_kb.saturating_sub(kb);
    }

    /// Convert a reservation into used space for a completed transfer.
    ///
    /// The reservation is always released. If the actual size no longer fits
    /// the ledger is left without the used space and the caller discards the file.
    pub fn commit(&mut self, reserved_kb: u64, actual_kb: u64) -> Result<(), QuotaError> {
        self.release(reserved_kb);
        let remaining = self.remaining_kb();
        if actual_kb > remaining {
            return Err(QuotaError::WouldExceed { requested: actual_kb, remaining });
        }
        self.used_kb += actual_kb;
        Ok(())
    }

    /// Count bytes that already exist on disk, without admission control.
    pub fn claim(&mut self, kb: u64) {
        self.used_kb += kb;
    }

    /// Return used space after a file is deleted.
    pub fn free(&mut self, kb: u64) {
        self.used_kb = self.used_kb.saturating_sub(kb);
    }

    pub fn status(&self) -> GlobalDownloadStatus {
        GlobalDownloadStatus {
            used_space_kb: self.used_kb,
            reserved_space_kb: self.reserved_kb,
            remaining_space_kb: self.remaining_kb(),
        }
    }
}

#[cfg(test)]
#[path = "quota_tests.rs"]
mod tests;
