// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-key worker tasks fed through ordered mailboxes.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMsg<T> {
    Update(T),
    /// Garbage-collection mark from the periodic sweep
    Expire,
    Shutdown,
}

/// At most one live worker per key.
///
/// A `Shutdown` retires the key; an `Update` that arrives for it afterwards
/// starts a fresh worker that first waits for the retiring one to finish.
pub struct WorkerDispatch<T> {
    mailboxes: HashMap<String, mpsc::UnboundedSender<WorkerMsg<T>>>,
    live: HashMap<String, JoinHandle<()>>,
    retiring: HashMap<String, JoinHandle<()>>,
}

impl<T> Default for WorkerDispatch<T> {
    fn default() -> Self {
        Self { mailboxes: HashMap::new(), live: HashMap::new(), retiring: HashMap::new() }
    }
}

impl<T: Send + 'static> WorkerDispatch<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `item` to the worker for `key`, starting one with `start` if
    /// there is none. `start` receives the mailbox with `item` already queued.
    pub fn update<F, Fut>(&mut self, key: &str, item: T, start: F)
    where
        F: FnOnce(mpsc::UnboundedReceiver<WorkerMsg<T>>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.prune();
        let mut item = item;
        if let Some(tx) = self.mailboxes.get(key) {
            match tx.send(WorkerMsg::Update(item)) {
                Ok(()) => return,
                Err(mpsc::error::SendError(msg)) => {
                    tracing::warn!(key, "worker exited unexpectedly; starting a new one");
                    self.retire(key);
                    item = match msg {
                        WorkerMsg::Update(item) => item,
                        _ => return,
                    };
                }
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(WorkerMsg::Update(item));
        let worker = start(rx);
        let handle = match self.retiring.remove(key) {
            Some(previous) => tokio::spawn(async move {
                let _ = previous.await;
                worker.await;
            }),
            None => tokio::spawn(worker),
        };
        tracing::debug!(key, "started worker");
        self.mailboxes.insert(key.to_string(), tx);
        self.live.insert(key.to_string(), handle);
    }

    /// Send a non-update message to a live worker. False if there is none.
    pub fn notify(&self, key: &str, msg: WorkerMsg<T>) -> bool {
        match self.mailboxes.get(key) {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }

    /// Ask the worker for `key` to finish, and retire the key.
    pub fn shutdown(&mut self, key: &str) {
        match self.mailboxes.get(key) {
            Some(tx) => {
                let _ = tx.send(WorkerMsg::Shutdown);
            }
            None => tracing::warn!(key, "shutdown for key without a worker"),
        }
        self.retire(key);
    }

    fn retire(&mut self, key: &str) {
        self.mailboxes.remove(key);
        if let Some(handle) = self.live.remove(key) {
            self.retiring.insert(key.to_string(), handle);
        }
    }

    fn prune(&mut self) {
        self.retiring.retain(|_, handle| !handle.is_finished());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.mailboxes.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.mailboxes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.mailboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mailboxes.is_empty()
    }

    /// Stop every worker without waiting. Used when the agent itself stops.
    pub fn abort_all(&mut self) {
        self.mailboxes.clear();
        for (_, handle) in self.live.drain().chain(self.retiring.drain()) {
            handle.abort();
        }
    }
}

impl<T> Drop for WorkerDispatch<T> {
    fn drop(&mut self) {
        for (_, handle) in self.live.drain().chain(self.retiring.drain()) {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
