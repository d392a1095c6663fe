// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use ef_bus::BusError;
use ef_core::Clock;
use uuid::Uuid;

use super::AppInstContext;

impl<C: Clock> AppInstContext<C> {
    /// Retry every instance that was waiting for `datastore`.
    ///
    /// Configs and datastores arrive in no particular order, so this rescans
    /// all statuses rather than remembering who asked.
    pub(super) fn check_and_recreate(&mut self, datastore: &Uuid) -> Result<usize, BusError> {
        let waiting: Vec<String> = self
            .statuses
            .get_all()
            .into_iter()
            .filter(|(_, s)| {
                s.missing_datastore
                    && s.storage_status_list.iter().any(|ss| ss.datastore_id == *datastore)
            })
            .map(|(key, _)| key)
            .collect();
        for key in &waiting {
            tracing::info!(key, %datastore, "datastore arrived; retrying instance");
            self.refresh(key)?;
        }
        Ok(waiting.len())
    }
}
