// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Edge fabric daemon library
//!
//! Agents run as supervised tokio tasks sharing one [`ef_bus::Bus`].

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod agents;
pub mod config;
pub mod env;
pub mod error;
pub mod heartbeat;
pub mod lifecycle;

pub use agents::AgentDeps;
pub use config::{ConfigError, DaemonConfig};
pub use error::AgentError;
pub use heartbeat::Heartbeat;
pub use lifecycle::{startup, Config, DaemonState, LifecycleError};
