// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ef-bus: local typed publish/subscribe between agents.
//!
//! A [`Publication`] is a keyed collection owned by one agent. A
//! [`Subscription`] is another agent's ordered, typed view of it. The
//! [`Bus`] registry hands out both ends by collection identity, and
//! [`RestartGraph`] sequences restart signals across agents.

mod change;
mod collection;
mod error;
mod persist;
mod publication;
mod registry;
mod restart;
mod subscription;

#[cfg(test)]
mod test_helpers;

pub use change::Change;
pub use collection::CollectionId;
pub use error::{BusError, HandlerResult};
pub use publication::Publication;
pub use registry::Bus;
pub use restart::{RestartGraph, RestartGraphBuilder};
pub use subscription::{SubView, Subscription};
