// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use ef_bus::BusError;
use thiserror::Error;

/// Errors that end an agent run loop. The supervisor restarts the agent.
///
/// Anything recoverable is recorded on a status record instead.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Fatal(String),
}
