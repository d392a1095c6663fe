// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dual-partition boot state.
//!
//! Two partitions, `IMGA` and `IMGB`. A new image is written to the one not
//! booted and marked `updating`; the next boot switches to it as
//! `inprogress`, and a completed test marks it `active` while the fallback
//! becomes `unused`.

use ef_bus::{Bus, BusError, Publication};
use ef_core::{AgentName, PartitionState, ZbootStatus};

pub const IMGA: &str = "IMGA";
pub const IMGB: &str = "IMGB";

/// Persistent partition table published by the base-OS manager.
#[derive(Clone)]
pub struct Zboot {
    partitions: Publication<ZbootStatus>,
}

impl Zboot {
    /// Open the table, seeding a fresh device that boots from `IMGA`.
    pub fn open(bus: &Bus) -> Result<Self, BusError> {
        let zboot = Self { partitions: bus.persistent_publication(AgentName::Baseosmgr, None)? };
        if zboot.partitions.is_empty() {
            tracing::info!("initializing partition table");
            zboot.partitions.publish(
                IMGA,
                &ZbootStatus {
                    partition_label: IMGA.to_string(),
                    partition_state: PartitionState::Active,
                    short_version: String::new(),
                    current_partition: true,
                },
            )?;
            zboot.partitions.publish(
                IMGB,
                &ZbootStatus {
                    partition_label: IMGB.to_string(),
                    partition_state: PartitionState::Unused,
                    short_version: String::new(),
                    current_partition: false,
                },
            )?;
        }
        Ok(zboot)
    }

    pub fn get(&self, label: &str) -> Option<ZbootStatus> {
        self.partitions.get(label)
    }

    pub fn current(&self) -> Option<ZbootStatus> {
        self.partitions.get_all().into_values().find(|p| p.current_partition)
    }

    pub fn other(&self) -> Option<ZbootStatus> {
        self.partitions.get_all().into_values().find(|p| !p.current_partition)
    }

    /// The partition running `version`, or waiting to boot it.
    pub fn holding(&self, version: &str) -> Option<ZbootStatus> {
        self.partitions.get_all().into_values().find(|p| {
            p.short_version == version
                && (p.current_partition || p.partition_state == PartitionState::Updating)
        })
    }

    /// Record `version` as written to `label`, to be booted next.
    pub fn install(&self, label: &str, version: &str) -> Result<(), BusError> {
        let Some(mut partition) = self.get(label) else {
            tracing::error!(label, "install into unknown partition");
            return Ok(());
        };
        tracing::info!(label, version, "partition updating");
        partition.short_version = version.to_string();
        partition.partition_state = PartitionState::Updating;
        self.partitions.publish(label, &partition)
    }

    /// Drop a pending switch to `label`.
    pub fn cancel(&self, label: &str) -> Result<(), BusError> {
        match self.get(label) {
            Some(mut partition) if !partition.current_partition => {
                tracing::info!(label, "pending partition switch cancelled");
                partition.partition_state = PartitionState::Unused;
                self.partitions.publish(label, &partition)
            }
            _ => Ok(()),
        }
    }

    /// The booted image passed its test: keep it and retire the fallback.
    pub fn mark_active(&self, label: &str) -> Result<(), BusError> {
        for (key, mut partition) in self.partitions.get_all() {
            let state = if key == label {
                PartitionState::Active
            } else if partition.partition_state == PartitionState::Active {
                PartitionState::Unused
            } else {
                continue;
            };
            if partition.partition_state != state {
                tracing::info!(label = %key, %state, "partition state");
                partition.partition_state = state;
                self.partitions.publish(&key, &partition)?;
            }
        }
        Ok(())
    }

    /// What the bootloader does at power-on: switch to a partition marked
    /// `updating`, which then runs on trial.
    pub fn boot(&self) -> Result<(), BusError> {
        let Some(mut next) =
            self.other().filter(|p| p.partition_state == PartitionState::Updating)
        else {
            return Ok(());
        };
        if let Some(mut previous) = self.current() {
            previous.current_partition = false;
            self.partitions.publish(&previous.partition_label.clone(), &previous)?;
        }
        tracing::info!(
            label = %next.partition_label,
            version = %next.short_version,
            "booting updated partition"
        );
        next.current_partition = true;
        next.partition_state = PartitionState::Inprogress;
        self.partitions.publish(&next.partition_label.clone(), &next)
    }
}

#[cfg(test)]
#[path = "zboot_tests.rs"]
mod tests;
