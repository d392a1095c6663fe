// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry handing out both ends of a collection by identity.

use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use ef_core::{AgentName, BusObject, ObjType};
use parking_lot::Mutex;

use crate::collection::{CollectionId, Store};
use crate::error::BusError;
use crate::publication::Publication;
use crate::subscription::Subscription;

type AnyStore = Arc<dyn Any + Send + Sync>;

struct BusInner {
    persist_root: Option<PathBuf>,
    stores: Mutex<HashMap<CollectionId, AnyStore>>,
}

/// Process-wide collection registry. Clones share the same registry.
///
/// Collections are created lazily by whichever end asks first, so a
/// subscriber may connect before the owning agent has started.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

impl Bus {
    /// Registry without a persistence root; persistent publications stay in memory.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(BusInner { persist_root: None, stores: Mutex::new(HashMap::new()) }),
        }
    }

    /// Registry whose persistent publications live under `root`.
    pub fn with_persist_root(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                persist_root: Some(root.into()),
                stores: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn persist_root(&self) -> Option<&PathBuf> {
        self.inner.persist_root.as_ref()
    }

    pub(crate) fn store<T: BusObject>(&self, id: CollectionId) -> Result<Arc<Store<T>>, BusError> {
        let mut stores = self.inner.stores.lock();
        let any =
            stores.entry(id).or_insert_with(|| Arc::new(Store::<T>::new(id)) as AnyStore).clone();
        any.downcast::<Store<T>>().map_err(|_| BusError::TypeMismatch(id.to_string()))
    }

    /// Ephemeral publication: survives agent restarts, not daemon restarts.
    pub fn publication<T: BusObject>(
        &self,
        agent: AgentName,
        scope: Option<ObjType>,
    ) -> Result<Publication<T>, BusError> {
        let store = self.store::<T>(CollectionId::new::<T>(agent, scope))?;
        Ok(Publication::new(store))
    }

    /// Publication backed by `<persist_root>/<agent>/[<scope>/]<Type>.json`,
    /// reloaded from disk on first use.
    pub fn persistent_publication<T: BusObject>(
        &self,
        agent: AgentName,
        scope: Option<ObjType>,
    ) -> Result<Publication<T>, BusError> {
        let id = CollectionId::new::<T>(agent, scope);
        let store = self.store::<T>(id)?;
        if let Some(root) = &self.inner.persist_root {
            store.attach_file(id.file_under(root))?;
        }
        Ok(Publication::new(store))
    }

    /// Inactive subscription on `agent`'s collection of `T`.
    pub fn subscribe<T: BusObject, C>(
        &self,
        agent: AgentName,
        scope: Option<ObjType>,
    ) -> Result<Subscription<T, C>, BusError> {
        let store = self.store::<T>(CollectionId::new::<T>(agent, scope))?;
        Ok(Subscription::new(store))
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
