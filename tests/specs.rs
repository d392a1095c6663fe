// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace specs: whole daemons over a real bus and state directory.

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/daemon/mod.rs"]
mod daemon;
