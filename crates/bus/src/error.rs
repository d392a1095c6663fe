// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the bus. All of them are fatal for the agent that
/// receives them; recoverable conditions are logged and absorbed instead.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("collection {0} is registered with a different record type")]
    TypeMismatch(String),
    #[error("failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid restart graph: {0}")]
    RestartGraph(String),
    #[error("{0}")]
    Fatal(String),
}

/// Return type of subscription handlers; `Err` takes the agent down.
pub type HandlerResult = Result<(), BusError>;
