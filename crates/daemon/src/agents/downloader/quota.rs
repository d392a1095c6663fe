// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared download quota, published as `GlobalDownloadStatus` after every change.

use std::path::Path;

use ef_bus::Publication;
use ef_core::quota::QuotaLedger;
use ef_core::{round_up_kb, GlobalDownloadStatus, QuotaError, GLOBAL_KEY};
use parking_lot::Mutex;

/// All workers share one of these. The ledger lock covers the arithmetic and
/// the in-memory publish only.
pub struct SpaceQuota {
    ledger: Mutex<QuotaLedger>,
    status: Publication<GlobalDownloadStatus>,
}

impl SpaceQuota {
    pub fn new(status: Publication<GlobalDownloadStatus>) -> Self {
        Self { ledger: Mutex::new(QuotaLedger::default()), status }
    }

    fn apply<R>(&self, f: impl FnOnce(&mut QuotaLedger) -> R) -> R {
        let mut ledger = self.ledger.lock();
        let result = f(&mut ledger);
        if let Err(e) = self.status.publish(GLOBAL_KEY, &ledger.status()) {
            tracing::error!(error = %e, "failed to publish download quota");
        }
        result
    }

    pub fn max_kb(&self) -> u64 {
        self.ledger.lock().max_kb()
    }

    pub fn set_max(&self, max_kb: u64) {
        self.apply(|l| l.set_max(max_kb));
    }

    pub fn init(&self, measured_kb: u64) {
        self.apply(|l| l.init(measured_kb));
    }

    pub fn try_reserve(&self, kb: u64) -> Result<(), QuotaError> {
        self.apply(|l| l.try_reserve(kb))
    }

    pub fn release(&self, kb: u64) {
        if kb > 0 {
            self.apply(|l| l.release(kb));
        }
    }

    pub fn commit(&self, reserved_kb: u64, actual_kb: u64) -> Result<(), QuotaError> {
        self.apply(|l| l.commit(reserved_kb, actual_kb))
    }

    pub fn claim(&self, kb: u64) {
        if kb > 0 {
            self.apply(|l| l.claim(kb));
        }
    }

    pub fn free(&self, kb: u64) {
        if kb > 0 {
            self.apply(|l| l.free(kb));
        }
    }

    pub fn status(&self) -> GlobalDownloadStatus {
        self.ledger.lock().status()
    }
}

/// Kilobytes already on disk under `dir`, counting each file rounded up.
pub fn measure_kb(dir: &Path) -> u64 {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };
    let mut total = 0;
    for entry in entries.flatten() {
        match entry.file_type() {
            Ok(ft) if ft.is_dir() => total += measure_kb(&entry.path()),
            Ok(ft) if ft.is_file() => {
                total += entry.metadata().map(|m| round_up_kb(m.len())).unwrap_or(0);
            }
            _ => {}
        }
    }
    total
}

#[cfg(test)]
#[path = "quota_tests.rs"]
mod tests;
