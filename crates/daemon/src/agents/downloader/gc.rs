// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic sweep for unreferenced downloads.

use ef_core::Clock;

use super::{dispatch_key, Shared};

/// Dispatch keys of statuses with `RefCount == 0` idle for at least the GC
/// time and not yet marked. The owning worker applies the mark.
pub(crate) fn expired_keys<C: Clock>(shared: &Shared<C>) -> Vec<String> {
    let gc_time = shared.settings.borrow().gc_time;
    let mut keys = Vec::new();
    for (obj_type, publication) in shared.statuses.all() {
        for (safename, status) in publication.get_all() {
            if status.ref_count == 0
                && !status.expired
                && shared.clock.since_ms(status.last_use_ms) >= gc_time
            {
                tracing::debug!(obj_type = %obj_type, safename, "download idle past gc time");
                keys.push(dispatch_key(obj_type, &safename));
            }
        }
    }
    keys
}

#[cfg(test)]
#[path = "gc_tests.rs"]
mod tests;
