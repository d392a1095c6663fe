// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restart agents that fail.
//!
//! Each agent runs in its own task under a child cancellation token. An
//! agent that fails or returns while the daemon is still up is started
//! again after a fixed backoff; a panic counts as a failure. Its ephemeral
//! publications stay in the bus across the restart, so it resumes from what
//! it last published.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ef_core::AgentName;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

use crate::error::AgentError;

pub struct Supervisor {
    cancel: CancellationToken,
    backoff: Duration,
    tasks: JoinSet<()>,
}

impl Supervisor {
    pub fn new(cancel: CancellationToken, backoff: Duration) -> Self {
        Self { cancel, backoff, tasks: JoinSet::new() }
    }

    /// Keep `start` running until the supervisor's token is cancelled.
    pub fn spawn<F, Fut>(&mut self, agent: AgentName, start: F)
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), AgentError>> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let backoff = self.backoff;
        self.tasks.spawn(supervise(agent, Arc::new(start), cancel, backoff));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancel every agent and wait up to `timeout` for them to return.
    /// Returns false if some were still running.
    pub async fn shutdown(&mut self, timeout: Duration) -> bool {
        self.cancel.cancel();
        let drained = tokio::time::timeout(timeout, async {
            while self.tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                remaining = self.tasks.len(),
                "agents still running at shutdown; aborting"
            );
            self.tasks.abort_all();
            while self.tasks.join_next().await.is_some() {}
            return false;
        }
        true
    }
}

async fn supervise<F, Fut>(
    agent: AgentName,
    start: Arc<F>,
    cancel: CancellationToken,
    backoff: Duration,
)
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), AgentError>> + Send + 'static,
{
    let mut restarts = 0u32;
    loop {
        tracing::info!(%agent, restarts, "starting agent");
        // Aborting this task drops the handle, which aborts the agent too.
        let outcome = AbortOnDropHandle::new(tokio::spawn(start(cancel.child_token()))).await;
        if cancel.is_cancelled() {
            if let Ok(Err(e)) = outcome {
                tracing::warn!(%agent, error = %e, "agent failed during shutdown");
            }
            return;
        }
        match outcome {
            Ok(Ok(())) => tracing::warn!(%agent, "agent returned unexpectedly"),
            Ok(Err(e)) => tracing::error!(%agent, error = %e, "agent failed"),
            Err(e) if e.is_panic() => tracing::error!(%agent, "agent panicked"),
            Err(e) => tracing::error!(%agent, error = %e, "agent task aborted"),
        }
        restarts += 1;
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(backoff) => {}
        }
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
