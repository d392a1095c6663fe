// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! App-instance manager: drives each instance from config through
//! download, verification, networking and domain start, with restart and
//! purge excursions counted by persistent command counters.

mod changes;
mod counters;
mod datastore;
mod update;

#[cfg(test)]
mod test_helpers;

pub use changes::{quantify_changes, Changes};
pub use counters::Counters;

use ef_bus::{Bus, BusError, HandlerResult, Publication, RestartGraph, SubView, Subscription};
use ef_core::{
    AgentName, AppInstanceConfig, AppInstanceStatus, AppNetworkConfig, AppNetworkStatus, Clock,
    DatastoreConfig, DomainConfig, DomainStatus, DownloaderConfig, DownloaderStatus, EidConfig,
    EidStatus, Inprogress, ObjType, StorageStatus, SwState, VerifyImageConfig, VerifyImageStatus,
    PURGE_CMD_COUNTER, RESTART_CMD_COUNTER,
};
use tokio_util::sync::CancellationToken;

use crate::agents::refs::{self, RefTally};
use crate::agents::AgentDeps;
use crate::error::AgentError;

const AGENT: AgentName = AgentName::Zedmanager;

/// Nodes of the restart chain towards the collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Link {
    /// Instance configs replayed by intake
    Config,
    Verifier,
    /// Identity manager statuses replayed
    Identity,
    /// Router statuses replayed
    Router,
    Eid,
    Network,
    Domain,
}

fn restart_chain() -> Result<RestartGraph<Link>, BusError> {
    RestartGraph::builder()
        .gate(Link::Eid, [Link::Config, Link::Verifier])
        .gate(Link::Network, [Link::Eid, Link::Identity])
        .gate(Link::Domain, [Link::Network, Link::Router])
        .build()
}

pub struct AppInstContext<C: Clock> {
    clock: C,
    statuses: Publication<AppInstanceStatus>,
    downloads: Publication<DownloaderConfig>,
    verifications: Publication<VerifyImageConfig>,
    eids: Publication<EidConfig>,
    networks: Publication<AppNetworkConfig>,
    domains: Publication<DomainConfig>,
    counters: Counters,
    configs: SubView<AppInstanceConfig>,
    datastores: SubView<DatastoreConfig>,
    download_status: SubView<DownloaderStatus>,
    verify_status: SubView<VerifyImageStatus>,
    eid_status: SubView<EidStatus>,
    network_status: SubView<AppNetworkStatus>,
    domain_status: SubView<DomainStatus>,
    restarts: RestartGraph<Link>,
}

type Sub<T, C> = Subscription<T, AppInstContext<C>>;

struct Subs<C: Clock> {
    configs: Sub<AppInstanceConfig, C>,
    datastores: Sub<DatastoreConfig, C>,
    downloads: Sub<DownloaderStatus, C>,
    verifications: Sub<VerifyImageStatus, C>,
    eids: Sub<EidStatus, C>,
    networks: Sub<AppNetworkStatus, C>,
    domains: Sub<DomainStatus, C>,
}

impl<C: Clock> Subs<C> {
    fn new(bus: &Bus) -> Result<Self, BusError> {
        Ok(Self {
            configs: bus
                .subscribe(AgentName::Zedagent, None)?
                .on_modify(handle_config_modify)
                .on_delete(handle_config_delete)
                .on_restart(handle_config_restarted)
                .on_synchronized(handle_config_synchronized),
            datastores: bus
                .subscribe(AgentName::Zedagent, None)?
                .on_modify(handle_datastore_modify),
            downloads: bus
                .subscribe(AgentName::Downloader, Some(ObjType::AppImg))?
                .on_modify(handle_download_status)
                .on_delete(handle_download_status),
            verifications: bus
                .subscribe(AgentName::Verifier, Some(ObjType::AppImg))?
                .on_modify(handle_verify_status)
                .on_delete(handle_verify_status)
                .on_restart(handle_verifier_restarted),
            eids: bus
                .subscribe(AgentName::Identitymgr, None)?
                .on_modify(handle_eid_status)
                .on_delete(handle_eid_status)
                .on_restart(handle_identity_restarted),
            networks: bus
                .subscribe(AgentName::Zedrouter, None)?
                .on_modify(handle_network_status)
                .on_delete(handle_network_status)
                .on_restart(handle_router_restarted),
            domains: bus
                .subscribe(AgentName::Domainmgr, None)?
                .on_modify(handle_domain_status)
                .on_delete(handle_domain_status),
        })
    }

    /// Everything but the verifier statuses, which gate startup.
    fn activate_rest(&mut self) {
        self.datastores.activate();
        self.downloads.activate();
        self.eids.activate();
        self.networks.activate();
        self.domains.activate();
        self.configs.activate();
    }
}

impl<C: Clock> AppInstContext<C> {
    fn new(bus: &Bus, clock: C, subs: &Subs<C>) -> Result<Self, BusError> {
        Ok(Self {
            clock,
            statuses: bus.publication(AGENT, None)?,
            downloads: bus.publication(AGENT, Some(ObjType::AppImg))?,
            verifications: bus.publication(AGENT, Some(ObjType::AppImg))?,
            eids: bus.publication(AGENT, None)?,
            networks: bus.publication(AGENT, None)?,
            domains: bus.publication(AGENT, None)?,
            counters: Counters::new(bus.persistent_publication(AGENT, None)?),
            configs: subs.configs.view(),
            datastores: subs.datastores.view(),
            download_status: subs.downloads.view(),
            verify_status: subs.verifications.view(),
            eid_status: subs.eids.view(),
            network_status: subs.networks.view(),
            domain_status: subs.domains.view(),
            restarts: restart_chain()?,
        })
    }

    /// Record a restart signal and announce every collection it unblocks.
    fn signal(&mut self, link: Link) {
        for fired in self.restarts.signal(link) {
            tracing::info!(?fired, "restart gate opened");
            match fired {
                Link::Eid => self.eids.signal_restarted(),
                Link::Network => self.networks.signal_restarted(),
                Link::Domain => self.domains.signal_restarted(),
                _ => {}
            }
        }
    }

    fn create(&mut self, config: &AppInstanceConfig) -> HandlerResult {
        let key = config.uuid_and_version.key();
        let uuid = config.uuid_and_version.uuid;
        let now = self.clock.epoch_ms();
        tracing::info!(key, name = %config.display_name, "creating app instance");
        let mut status = AppInstanceStatus::from_config(config);

        match self.counters.get(&uuid, PURGE_CMD_COUNTER) {
            Some(stored) if stored != config.purge_cmd.counter => {
                tracing::info!(
                    key,
                    stored,
                    counter = config.purge_cmd.counter,
                    "purge requested while down"
                );
                status.state = SwState::Purging;
                status.purge_inprogress = Inprogress::Download;
            }
            Some(_) => {}
            None => self.counters.set(&uuid, PURGE_CMD_COUNTER, config.purge_cmd.counter, now)?,
        }
        // Nothing runs yet, so a moved restart counter needs no action
        self.counters.set(&uuid, RESTART_CMD_COUNTER, config.restart_cmd.counter, now)?;

        if !config.errors.is_empty() {
            status.set_error(config.errors.join("; "), now);
            return self.statuses.publish(&key, &status);
        }
        self.do_update(config, &mut status)?;
        self.statuses.publish(&key, &status)?;
        self.sync_refs()
    }

    fn modify(
        &mut self,
        config: &AppInstanceConfig,
        mut status: AppInstanceStatus,
    ) -> HandlerResult {
        let key = config.uuid_and_version.key();
        let uuid = config.uuid_and_version.uuid;
        let now = self.clock.epoch_ms();
        if !config.errors.is_empty() {
            let error = config.errors.join("; ");
            if status.error != error {
                status.set_error(error, now);
            }
            return self.statuses.publish(&key, &status);
        }

        let changes = quantify_changes(config, &status);
        if config.restart_cmd != status.restart_cmd {
            status.restart_cmd = config.restart_cmd;
            self.counters.set(&uuid, RESTART_CMD_COUNTER, config.restart_cmd.counter, now)?;
            if config.activate {
                tracing::info!(key, counter = config.restart_cmd.counter, "restart requested");
                start_restart(&mut status);
            } else {
                tracing::info!(
                    key,
                    counter = config.restart_cmd.counter,
                    "restart deferred until activation"
                );
                status.pending_restart = true;
            }
        } else if changes.need_restart && status.activated {
            tracing::info!(key, "resources changed; restarting");
            start_restart(&mut status);
        }
        if status.pending_restart && config.activate && status.activated {
            tracing::info!(key, "applying deferred restart");
            start_restart(&mut status);
        }

        if config.purge_cmd != status.purge_cmd || changes.need_purge {
            tracing::info!(key, counter = config.purge_cmd.counter, "purging");
            status.purge_cmd = config.purge_cmd;
            status.state = SwState::Purging;
            status.purge_inprogress = Inprogress::Download;
            status.restart_inprogress = Inprogress::None;
            status.pending_restart = false;
            let previous = std::mem::take(&mut status.storage_status_list);
            status.storage_status_list = config
                .storage_config_list
                .iter()
                .map(|sc| {
                    let fresh = StorageStatus::from_config(sc);
                    previous
                        .iter()
                        .find(|old| old.safename() == fresh.safename())
                        .cloned()
                        .unwrap_or(fresh)
                })
                .collect();
        }

        status.uuid_and_version = config.uuid_and_version.clone();
        status.display_name = config.display_name.clone();
        status.fixed_resources = config.fixed_resources.clone();
        status.overlay_network_list = config.overlay_network_list.clone();
        status.underlay_network_list = config.underlay_network_list.clone();
        status.io_adapter_list = config.io_adapter_list.clone();

        self.do_update(config, &mut status)?;
        self.statuses.publish(&key, &status)?;
        self.sync_refs()
    }

    /// Cascade removal of everything produced for `config`.
    fn delete(&mut self, key: &str, config: &AppInstanceConfig) -> HandlerResult {
        let uuid = config.uuid_and_version.uuid;
        tracing::info!(key, "deleting app instance");
        if self.domains.get(key).is_some() {
            self.domains.unpublish(key)?;
        }
        if self.networks.get(key).is_some() {
            self.networks.unpublish(key)?;
        }
        for (eid_key, eid) in self.eids.get_all() {
            if eid.uuid_and_version.uuid == uuid {
                self.eids.unpublish(&eid_key)?;
            }
        }
        if self.statuses.get(key).is_some() {
            self.statuses.unpublish(key)?;
        }
        self.sync_refs()?;
        self.counters.delete_all(&uuid)?;
        Ok(())
    }

    /// Re-run the update for one instance after a collaborator moved.
    fn refresh(&mut self, key: &str) -> HandlerResult {
        let (Some(config), Some(mut status)) = (self.configs.get(key), self.statuses.get(key))
        else {
            return Ok(());
        };
        if !config.errors.is_empty() {
            return Ok(());
        }
        self.do_update(&config, &mut status)?;
        self.statuses.publish(key, &status)?;
        self.sync_refs()
    }

    fn refresh_artifact(&mut self, safename: &str) -> HandlerResult {
        let affected: Vec<String> = self
            .statuses
            .get_all()
            .into_iter()
            .filter(|(_, s)| s.storage_status_list.iter().any(|ss| ss.safename() == safename))
            .map(|(key, _)| key)
            .collect();
        for key in affected {
            self.refresh(&key)?;
        }
        Ok(())
    }

    /// Bring downloader and verifier configs in line with the references
    /// held across all instances.
    fn sync_refs(&self) -> HandlerResult {
        let mut downloads = RefTally::default();
        let mut verifications = RefTally::default();
        for (key, status) in self.statuses.get_all() {
            let activate = self.configs.get(&key).is_some_and(|c| c.activate);
            for ss in &status.storage_status_list {
                if ss.has_downloader_ref {
                    downloads.hold(ss, activate);
                }
                if ss.has_verifier_ref {
                    verifications.hold(ss, true);
                }
            }
        }
        refs::sync_downloads(&self.downloads, ObjType::AppImg, &downloads, &self.datastores)?;
        refs::sync_verifications(&self.verifications, ObjType::AppImg, &verifications)
    }
}

fn start_restart(status: &mut AppInstanceStatus) {
    status.state = SwState::Restarting;
    status.restart_inprogress = Inprogress::BringDown;
    status.pending_restart = false;
}

fn handle_config_modify<C: Clock>(
    ctx: &mut AppInstContext<C>,
    key: &str,
    config: &AppInstanceConfig,
) -> HandlerResult {
    match ctx.statuses.get(key) {
        Some(status) => ctx.modify(config, status),
        None => ctx.create(config),
    }
}

fn handle_config_delete<C: Clock>(
    ctx: &mut AppInstContext<C>,
    key: &str,
    config: &AppInstanceConfig,
) -> HandlerResult {
    ctx.delete(key, config)
}

fn handle_config_restarted<C: Clock>(ctx: &mut AppInstContext<C>, done: bool) -> HandlerResult {
    if done {
        ctx.signal(Link::Config);
    }
    Ok(())
}

/// Statuses left from before an agent restart whose config is gone.
fn handle_config_synchronized<C: Clock>(ctx: &mut AppInstContext<C>, _done: bool) -> HandlerResult {
    for (key, status) in ctx.statuses.get_all() {
        if ctx.configs.get(&key).is_some() {
            continue;
        }
        tracing::info!(key, "removing orphaned app instance status");
        let config = AppInstanceConfig {
            uuid_and_version: status.uuid_and_version.clone(),
            display_name: status.display_name.clone(),
            activate: false,
            fixed_resources: status.fixed_resources.clone(),
            storage_config_list: Vec::new(),
            overlay_network_list: Vec::new(),
            underlay_network_list: Vec::new(),
            io_adapter_list: Vec::new(),
            restart_cmd: status.restart_cmd,
            purge_cmd: status.purge_cmd,
            errors: Vec::new(),
        };
        ctx.delete(&key, &config)?;
    }
    Ok(())
}

fn handle_datastore_modify<C: Clock>(
    ctx: &mut AppInstContext<C>,
    _key: &str,
    datastore: &DatastoreConfig,
) -> HandlerResult {
    ctx.check_and_recreate(&datastore.uuid)?;
    Ok(())
}

fn handle_download_status<C: Clock>(
    ctx: &mut AppInstContext<C>,
    key: &str,
    _status: &DownloaderStatus,
) -> HandlerResult {
    ctx.refresh_artifact(key)
}

fn handle_verify_status<C: Clock>(
    ctx: &mut AppInstContext<C>,
    key: &str,
    _status: &VerifyImageStatus,
) -> HandlerResult {
    ctx.refresh_artifact(key)
}

fn handle_verifier_restarted<C: Clock>(ctx: &mut AppInstContext<C>, done: bool) -> HandlerResult {
    if done {
        ctx.signal(Link::Verifier);
    }
    Ok(())
}

fn handle_eid_status<C: Clock>(
    ctx: &mut AppInstContext<C>,
    _key: &str,
    status: &EidStatus,
) -> HandlerResult {
    ctx.refresh(&status.uuid_and_version.key())
}

fn handle_identity_restarted<C: Clock>(ctx: &mut AppInstContext<C>, done: bool) -> HandlerResult {
    if done {
        ctx.signal(Link::Identity);
    }
    Ok(())
}

fn handle_network_status<C: Clock>(
    ctx: &mut AppInstContext<C>,
    key: &str,
    _status: &AppNetworkStatus,
) -> HandlerResult {
    ctx.refresh(key)
}

fn handle_router_restarted<C: Clock>(ctx: &mut AppInstContext<C>, done: bool) -> HandlerResult {
    if done {
        ctx.signal(Link::Router);
    }
    Ok(())
}

fn handle_domain_status<C: Clock>(
    ctx: &mut AppInstContext<C>,
    key: &str,
    _status: &DomainStatus,
) -> HandlerResult {
    ctx.refresh(key)
}

/// Run the app-instance manager until cancelled.
///
/// Nothing is acted on until the verifier has republished what it already
/// holds, so instances with verified images skip their downloads.
pub async fn run<C: Clock>(
    deps: AgentDeps<C>,
    cancel: CancellationToken,
) -> Result<(), AgentError> {
    let heartbeat = deps.heartbeat(AGENT);
    let mut subs = Subs::new(&deps.bus)?;
    let mut ctx = AppInstContext::new(&deps.bus, deps.clock.clone(), &subs)?;
    ctx.eids.clear_restarted();
    ctx.networks.clear_restarted();
    ctx.domains.clear_restarted();

    let mut ticker = heartbeat.ticker();
    subs.verifications.activate();
    while !subs.verifications.restarted() {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            change = subs.verifications.recv() => {
                subs.verifications.process_change(change, &mut ctx)?
            }
            _ = ticker.tick() => heartbeat.touch(),
        }
    }
    tracing::info!("verifier restarted; starting app instance manager");
    subs.activate_rest();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            change = subs.configs.recv() => subs.configs.process_change(change, &mut ctx)?,
            change = subs.datastores.recv() => subs.datastores.process_change(change, &mut ctx)?,
            change = subs.downloads.recv() => subs.downloads.process_change(change, &mut ctx)?,
            change = subs.verifications.recv() => {
                subs.verifications.process_change(change, &mut ctx)?
            }
            change = subs.eids.recv() => subs.eids.process_change(change, &mut ctx)?,
            change = subs.networks.recv() => subs.networks.process_change(change, &mut ctx)?,
            change = subs.domains.recv() => subs.domains.process_change(change, &mut ctx)?,
            _ = ticker.tick() => heartbeat.touch(),
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
