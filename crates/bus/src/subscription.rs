// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The consuming side of a collection.

use std::collections::BTreeMap;
use std::sync::Arc;

use ef_core::BusObject;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::change::Change;
use crate::collection::{CollectionId, Store};
use crate::error::{BusError, HandlerResult};

type ItemHandler<C, T> = fn(&mut C, &str, &T) -> HandlerResult;
type FlagHandler<C> = fn(&mut C, bool) -> HandlerResult;

#[derive(Debug)]
struct ViewState<T> {
    items: BTreeMap<String, T>,
    restarted: bool,
    synchronized: bool,
}

/// Read-only handle on a subscription's shadow copy.
///
/// Handlers keep views of other subscriptions in their agent context to
/// look up related records. Lookups never block and return `None` on miss.
pub struct SubView<T> {
    state: Arc<RwLock<ViewState<T>>>,
}

impl<T> Clone for SubView<T> {
    fn clone(&self) -> Self {
        Self { state: Arc::clone(&self.state) }
    }
}

impl<T: Clone> SubView<T> {
    fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ViewState {
                items: BTreeMap::new(),
                restarted: false,
                synchronized: false,
            })),
        }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.state.read().items.get(key).cloned()
    }

    pub fn get_all(&self) -> BTreeMap<String, T> {
        self.state.read().items.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn restarted(&self) -> bool {
        self.state.read().restarted
    }

    pub fn synchronized(&self) -> bool {
        self.state.read().synchronized
    }
}

/// Typed, ordered view of one remote collection, dispatching to handlers
/// that take the agent context `C`.
pub struct Subscription<T: BusObject, C> {
    store: Arc<Store<T>>,
    rx: Option<mpsc::UnboundedReceiver<Change<T>>>,
    view: SubView<T>,
    on_modify: Option<ItemHandler<C, T>>,
    on_delete: Option<ItemHandler<C, T>>,
    on_restart: Option<FlagHandler<C>>,
    on_synchronized: Option<FlagHandler<C>>,
}

impl<T: BusObject, C> Subscription<T, C> {
    pub(crate) fn new(store: Arc<Store<T>>) -> Self {
        Self {
            store,
            rx: None,
            view: SubView::new(),
            on_modify: None,
            on_delete: None,
            on_restart: None,
            on_synchronized: None,
        }
    }

    /// Called for both creation and update, after the shadow copy is updated.
    pub fn on_modify(mut self, f: ItemHandler<C, T>) -> Self {
        self.on_modify = Some(f);
        self
    }

    /// Called with the last known item, after it left the shadow copy.
    pub fn on_delete(mut self, f: ItemHandler<C, T>) -> Self {
        self.on_delete = Some(f);
        self
    }

    pub fn on_restart(mut self, f: FlagHandler<C>) -> Self {
        self.on_restart = Some(f);
        self
    }

    pub fn on_synchronized(mut self, f: FlagHandler<C>) -> Self {
        self.on_synchronized = Some(f);
        self
    }

    pub fn id(&self) -> CollectionId {
        self.store.id
    }

    pub fn view(&self) -> SubView<T> {
        self.view.clone()
    }

    pub fn restarted(&self) -> bool {
        self.view.restarted()
    }

    pub fn synchronized(&self) -> bool {
        self.view.synchronized()
    }

    /// Connect to the publication.
    ///
    /// Under the publication lock the current snapshot is enqueued as one
    /// modify per entry, then the restart marker if the publisher already
    /// signalled, then the synchronized marker. Later mutations queue behind.
    pub fn activate(&mut self) {
        if self.rx.is_some() {
            tracing::warn!(collection = %self.store.id, "subscription already active");
            return;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.store.inner.lock();
        for (key, item) in &inner.items {
            let _ = tx.send(Change::Modify { key: key.clone(), item: item.clone() });
        }
        if inner.restarted {
            let _ = tx.send(Change::Restarted);
        }
        let _ = tx.send(Change::Synchronized);
        inner.add_subscriber(tx);
        drop(inner);
        self.rx = Some(rx);
    }

    /// Next change. Never resolves before [`activate`](Self::activate).
    pub async fn recv(&mut self) -> Change<T> {
        match self.rx.as_mut() {
            Some(rx) => match rx.recv().await {
                Some(change) => change,
                None => std::future::pending().await,
            },
            None => std::future::pending().await,
        }
    }

    /// Apply one change to the shadow copy and dispatch its handler.
    pub fn process_change(&mut self, change: Change<T>, ctx: &mut C) -> HandlerResult {
        match change {
            Change::Modify { key, item } => {
                if item.key() != key {
                    tracing::error!(
                        collection = %self.store.id,
                        key,
                        item_key = %item.key(),
                        "key mismatch; notification dropped"
                    );
                    return Ok(());
                }
                self.view.state.write().items.insert(key.clone(), item.clone());
                match self.on_modify {
                    Some(f) => f(ctx, &key, &item),
                    None => Ok(()),
                }
            }
            Change::Delete { key } => {
                let last = self.view.state.write().items.remove(&key);
                match (last, self.on_delete) {
                    (None, _) => {
                        tracing::warn!(collection = %self.store.id, key, "delete of unknown key");
                        Ok(())
                    }
                    (Some(last), Some(f)) => f(ctx, &key, &last),
                    (Some(_), None) => Ok(()),
                }
            }
            Change::Restarted => {
                {
                    let mut state = self.view.state.write();
                    if state.restarted {
                        return Ok(());
                    }
                    state.restarted = true;
                }
                tracing::info!(collection = %self.store.id, "observed restarted");
                match self.on_restart {
                    Some(f) => f(ctx, true),
                    None => Ok(()),
                }
            }
            Change::Synchronized => {
                {
                    let mut state = self.view.state.write();
                    if state.synchronized {
                        return Ok(());
                    }
                    state.synchronized = true;
                }
                match self.on_synchronized {
                    Some(f) => f(ctx, true),
                    None => Ok(()),
                }
            }
        }
    }

    /// Process every change already queued, without waiting.
    pub fn drain(&mut self, ctx: &mut C) -> Result<usize, BusError> {
        let mut count = 0;
        loop {
            let next = match self.rx.as_mut() {
                Some(rx) => rx.try_recv().ok(),
                None => None,
            };
            match next {
                Some(change) => {
                    self.process_change(change, ctx)?;
                    count += 1;
                }
                None => return Ok(count),
            }
        }
    }
}

#[cfg(test)]
#[path = "subscription_tests.rs"]
mod tests;
