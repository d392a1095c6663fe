// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stand-ins for the identity, routing and domain agents.
//!
//! Each one answers every config with the status a healthy collaborator
//! would publish, and relays the restarted signal once its config
//! collection has restarted.

use ef_bus::{HandlerResult, Publication, Subscription};
use ef_core::{
    AgentName, AppNetworkConfig, AppNetworkStatus, BusObject, Clock, DomainConfig, DomainStatus,
    EidConfig, EidStatus, SwState,
};
use tokio_util::sync::CancellationToken;

use crate::agents::AgentDeps;
use crate::error::AgentError;

/// A config record with a canned healthy status.
pub trait Acknowledge: BusObject {
    type Status: BusObject;

    /// Agent that answers this config.
    const RESPONDER: AgentName;

    fn acknowledge(&self) -> Self::Status;
}

impl Acknowledge for EidConfig {
    type Status = EidStatus;
    const RESPONDER: AgentName = AgentName::Identitymgr;

    fn acknowledge(&self) -> EidStatus {
        EidStatus {
            uuid_and_version: self.uuid_and_version.clone(),
            display_name: self.display_name.clone(),
            details: self.details.clone(),
        }
    }
}

impl Acknowledge for AppNetworkConfig {
    type Status = AppNetworkStatus;
    const RESPONDER: AgentName = AgentName::Zedrouter;

    fn acknowledge(&self) -> AppNetworkStatus {
        AppNetworkStatus {
            uuid_and_version: self.uuid_and_version.clone(),
            display_name: self.display_name.clone(),
            activated: self.activate,
            error: String::new(),
        }
    }
}

impl Acknowledge for DomainConfig {
    type Status = DomainStatus;
    const RESPONDER: AgentName = AgentName::Domainmgr;

    fn acknowledge(&self) -> DomainStatus {
        DomainStatus {
            uuid_and_version: self.uuid_and_version.clone(),
            display_name: self.display_name.clone(),
            activated: self.activate,
            state: if self.activate { SwState::Installed } else { SwState::Delivered },
            error: String::new(),
        }
    }
}

pub struct LoopbackContext<Cfg: Acknowledge> {
    statuses: Publication<Cfg::Status>,
}

fn handle_modify<Cfg: Acknowledge>(
    ctx: &mut LoopbackContext<Cfg>,
    key: &str,
    config: &Cfg,
) -> HandlerResult {
    ctx.statuses.publish(key, &config.acknowledge())
}

fn handle_delete<Cfg: Acknowledge>(
    ctx: &mut LoopbackContext<Cfg>,
    key: &str,
    _config: &Cfg,
) -> HandlerResult {
    if ctx.statuses.get(key).is_none() {
        return Ok(());
    }
    ctx.statuses.unpublish(key)
}

fn handle_restart<Cfg: Acknowledge>(ctx: &mut LoopbackContext<Cfg>, done: bool) -> HandlerResult {
    if done && !ctx.statuses.restarted() {
        ctx.statuses.signal_restarted();
    }
    Ok(())
}

/// Answer `Cfg` records published by `owner` until cancelled.
pub async fn run<Cfg: Acknowledge, C: Clock>(
    deps: AgentDeps<C>,
    owner: AgentName,
    cancel: CancellationToken,
) -> Result<(), AgentError> {
    let agent = Cfg::RESPONDER;
    let heartbeat = deps.heartbeat(agent);
    let mut ctx = LoopbackContext::<Cfg> { statuses: deps.bus.publication(agent, None)? };
    ctx.statuses.clear_restarted();

    let mut sub: Subscription<Cfg, LoopbackContext<Cfg>> = deps
        .bus
        .subscribe(owner, None)?
        .on_modify(handle_modify::<Cfg>)
        .on_delete(handle_delete::<Cfg>)
        .on_restart(handle_restart::<Cfg>);
    sub.activate();
    tracing::info!(%agent, %owner, collection = Cfg::TYPE_NAME, "loopback started");

    let mut ticker = heartbeat.ticker();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            change = sub.recv() => sub.process_change(change, &mut ctx)?,
            _ = ticker.tick() => heartbeat.touch(),
        }
    }
}

#[cfg(test)]
#[path = "loopback_tests.rs"]
mod tests;
