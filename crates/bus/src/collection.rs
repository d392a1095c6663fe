// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared storage behind a publication and its subscriptions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ef_core::{AgentName, BusObject, ObjType};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::change::Change;
use crate::error::BusError;
use crate::persist;

/// `(agent, scope?, record type)` identity of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionId {
    pub agent: AgentName,
    pub scope: Option<ObjType>,
    pub type_name: &'static str,
}

impl CollectionId {
    pub fn new<T: BusObject>(agent: AgentName, scope: Option<ObjType>) -> Self {
        Self { agent, scope, type_name: T::TYPE_NAME }
    }

    /// `<root>/<agent>/[<scope>/]<TypeName>.json`
    pub fn file_under(&self, root: &Path) -> PathBuf {
        let mut dir = root.join(self.agent.as_str());
        if let Some(scope) = self.scope {
            dir = dir.join(scope.as_str());
        }
        dir.join(format!("{}.json", self.type_name))
    }
}

impl std::fmt::Display for CollectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.scope {
            Some(scope) => write!(f, "{}/{}/{}", self.agent, scope, self.type_name),
            None => write!(f, "{}/{}", self.agent, self.type_name),
        }
    }
}

pub(crate) struct StoreInner<T> {
    pub(crate) items: BTreeMap<String, T>,
    pub(crate) restarted: bool,
    subscribers: Vec<mpsc::UnboundedSender<Change<T>>>,
    persist_path: Option<PathBuf>,
}

/// One collection: its items, restart flag, subscriber channels and
/// optional backing file. The mutex is held across mutate and fan-out so
/// every subscriber sees changes in call order.
pub(crate) struct Store<T> {
    pub(crate) id: CollectionId,
    pub(crate) inner: Mutex<StoreInner<T>>,
}

impl<T: BusObject> Store<T> {
    pub(crate) fn new(id: CollectionId) -> Self {
        Self {
            id,
            inner: Mutex::new(StoreInner {
                items: BTreeMap::new(),
                restarted: false,
                subscribers: Vec::new(),
                persist_path: None,
            }),
        }
    }

    /// Back the collection with a file, loading what the file holds.
    ///
    /// Loaded entries that differ from memory are fanned out as modifies.
    pub(crate) fn attach_file(&self, path: PathBuf) -> Result<(), BusError> {
        let mut inner = self.inner.lock();
        if inner.persist_path.is_some() {
            return Ok(());
        }
        let loaded: BTreeMap<String, T> = persist::load(&path)?;
        let count = loaded.len();
        for (key, item) in loaded {
            if inner.items.get(&key) == Some(&item) {
                continue;
            }
            inner.items.insert(key.clone(), item.clone());
            inner.fan_out(Change::Modify { key, item });
        }
        inner.persist_path = Some(path);
        inner.save()?;
        tracing::info!(collection = %self.id, count, "attached persistent collection");
        Ok(())
    }
}

impl<T: BusObject> StoreInner<T> {
    pub(crate) fn fan_out(&mut self, change: Change<T>) {
        self.subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }

    pub(crate) fn add_subscriber(&mut self, tx: mpsc::UnboundedSender<Change<T>>) {
        self.subscribers.push(tx);
    }

    pub(crate) fn save(&self) -> Result<(), BusError> {
        match &self.persist_path {
            Some(path) => persist::save(path, &self.items),
            None => Ok(()),
        }
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
