// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ef-core: object model shared by every edge fabric agent

pub mod macros;

pub mod agent;
pub mod clock;
pub mod id;
pub mod object;
pub mod paths;
pub mod quota;
pub mod state;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use agent::AgentName;
pub use clock::{Clock, FakeClock, SystemClock};
pub use id::{safename, safename_to_filename, UuidAndVersion};
pub use object::{BusObject, GLOBAL_KEY};
pub use paths::Paths;
pub use quota::{round_up_kb, QuotaError};
pub use state::{Inprogress, ObjType, SwState};
pub use types::*;
