// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the bus unit tests.

use serde::{Deserialize, Serialize};

use crate::HandlerResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub value: u32,
}

ef_core::bus_object!(Item, "Item", |s| s.name.clone());

pub fn item(name: &str, value: u32) -> Item {
    Item { name: name.to_string(), value }
}

/// Records every handler invocation in order.
#[derive(Debug, Default)]
pub struct Recorder {
    pub events: Vec<String>,
    /// Modifies seen before the synchronized handler ran
    pub modifies_before_sync: Option<usize>,
    pub restart_calls: usize,
}

pub fn on_modify(ctx: &mut Recorder, key: &str, item: &Item) -> HandlerResult {
    ctx.events.push(format!("modify {}={}", key, item.value));
    Ok(())
}

pub fn on_delete(ctx: &mut Recorder, key: &str, item: &Item) -> HandlerResult {
    ctx.events.push(format!("delete {}={}", key, item.value));
    Ok(())
}

pub fn on_restart(ctx: &mut Recorder, done: bool) -> HandlerResult {
    ctx.restart_calls += 1;
    ctx.events.push(format!("restarted {}", done));
    Ok(())
}

pub fn on_synchronized(ctx: &mut Recorder, done: bool) -> HandlerResult {
    let modifies = ctx.events.iter().filter(|e| e.starts_with("modify")).count();
    ctx.modifies_before_sync = Some(modifies);
    ctx.events.push(format!("synchronized {}", done));
    Ok(())
}
