// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Purge and restart counters remembered across reboots.

use ef_bus::{BusError, Publication};
use ef_core::UuidToNum;
use uuid::Uuid;

/// Persistent `(uuid, tag) -> number` map on the bus.
#[derive(Clone)]
pub struct Counters {
    publication: Publication<UuidToNum>,
}

impl Counters {
    pub fn new(publication: Publication<UuidToNum>) -> Self {
        Self { publication }
    }

    pub fn get(&self, uuid: &Uuid, tag: &str) -> Option<u32> {
        self.publication.get(&UuidToNum::key_for(uuid, tag)).map(|n| n.number)
    }

    pub fn set(&self, uuid: &Uuid, tag: &str, number: u32, now_ms: u64) -> Result<(), BusError> {
        let key = UuidToNum::key_for(uuid, tag);
        if self.publication.get(&key).is_some_and(|n| n.number == number && n.in_use) {
            return Ok(());
        }
        tracing::debug!(%uuid, tag, number, "recording counter");
        let entry = UuidToNum {
            uuid: *uuid,
            tag: tag.to_string(),
            number,
            last_use_ms: now_ms,
            in_use: true,
        };
        self.publication.publish(&key, &entry)
    }

    /// Forget every counter of `uuid`.
    pub fn delete_all(&self, uuid: &Uuid) -> Result<(), BusError> {
        for (key, entry) in self.publication.get_all() {
            if entry.uuid == *uuid {
                self.publication.unpublish(&key)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "counters_tests.rs"]
mod tests;
