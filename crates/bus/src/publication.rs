// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The owning side of a collection.

use std::collections::BTreeMap;
use std::sync::Arc;

use ef_core::BusObject;

use crate::change::Change;
use crate::collection::{CollectionId, Store};
use crate::error::BusError;

/// Keyed collection owned and mutated by exactly one agent.
///
/// Clones share the same collection.
pub struct Publication<T: BusObject> {
    store: Arc<Store<T>>,
}

impl<T: BusObject> Clone for Publication<T> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store) }
    }
}

impl<T: BusObject> Publication<T> {
    pub(crate) fn new(store: Arc<Store<T>>) -> Self {
        Self { store }
    }

    pub fn id(&self) -> CollectionId {
        self.store.id
    }

    /// Upsert `item` under `key` and notify subscribers.
    ///
    /// Identical content is a no-op. An item whose own key disagrees with
    /// `key` is logged and dropped.
    pub fn publish(&self, key: &str, item: &T) -> Result<(), BusError> {
        if item.key() != key {
            tracing::error!(
                collection = %self.store.id,
                key,
                item_key = %item.key(),
                "publish key mismatch; dropped"
            );
            return Ok(());
        }
        let mut inner = self.store.inner.lock();
        if inner.items.get(key) == Some(item) {
            return Ok(());
        }
        inner.items.insert(key.to_string(), item.clone());
        inner.fan_out(Change::Modify { key: key.to_string(), item: item.clone() });
        inner.save()
    }

    /// Remove `key` and notify subscribers. An absent key is logged, not fatal.
    pub fn unpublish(&self, key: &str) -> Result<(), BusError> {
        let mut inner = self.store.inner.lock();
        if inner.items.remove(key).is_none() {
            tracing::error!(collection = %self.store.id, key, "unpublish of unknown key");
            return Ok(());
        }
        inner.fan_out(Change::Delete { key: key.to_string() });
        inner.save()
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.store.inner.lock().items.get(key).cloned()
    }

    /// Owned snapshot; later mutations are not reflected.
    pub fn get_all(&self) -> BTreeMap<String, T> {
        self.store.inner.lock().items.clone()
    }

    pub fn len(&self) -> usize {
        self.store.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn restarted(&self) -> bool {
        self.store.inner.lock().restarted
    }

    /// Mark the boot-time publish burst complete. Fires at most once per
    /// lifetime; a repeated call is logged and ignored.
    pub fn signal_restarted(&self) {
        let mut inner = self.store.inner.lock();
        if inner.restarted {
            tracing::error!(collection = %self.store.id, "signal_restarted called twice");
            return;
        }
        inner.restarted = true;
        inner.fan_out(Change::Restarted);
        tracing::info!(collection = %self.store.id, "restarted");
    }

    /// Reset the flag at boot, before any publish. Subscribers that already
    /// observed a restart keep their flag.
    pub fn clear_restarted(&self) {
        self.store.inner.lock().restarted = false;
    }
}

#[cfg(test)]
#[path = "publication_tests.rs"]
mod tests;
