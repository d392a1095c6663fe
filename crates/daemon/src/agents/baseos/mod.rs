// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Base-OS manager: fetches and verifies base OS images, writes them into
//! the spare boot partition, and fetches certificate objects into `certs/`.

mod base_os;
mod cert;
pub mod zboot;

#[cfg(test)]
mod test_helpers;

pub use zboot::Zboot;

use ef_bus::{Bus, BusError, HandlerResult, Publication, SubView, Subscription};
use ef_core::{
    AgentName, BaseOsConfig, BaseOsStatus, CertObjConfig, CertObjStatus, Clock, DatastoreConfig,
    DownloaderConfig, DownloaderStatus, ObjType, Paths, StorageConfig, StorageStatus, SwState,
    VerifyImageConfig, VerifyImageStatus,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agents::refs::{self, RefTally};
use crate::agents::AgentDeps;
use crate::error::AgentError;

const AGENT: AgentName = AgentName::Baseosmgr;

pub struct BaseOsContext<C: Clock> {
    clock: C,
    paths: Paths,
    zboot: Zboot,
    statuses: Publication<BaseOsStatus>,
    cert_statuses: Publication<CertObjStatus>,
    downloads: Publication<DownloaderConfig>,
    cert_downloads: Publication<DownloaderConfig>,
    verifications: Publication<VerifyImageConfig>,
    configs: SubView<BaseOsConfig>,
    cert_configs: SubView<CertObjConfig>,
    datastores: SubView<DatastoreConfig>,
    download_status: SubView<DownloaderStatus>,
    cert_download_status: SubView<DownloaderStatus>,
    verify_status: SubView<VerifyImageStatus>,
}

type Sub<T, C> = Subscription<T, BaseOsContext<C>>;

struct Subs<C: Clock> {
    configs: Sub<BaseOsConfig, C>,
    certs: Sub<CertObjConfig, C>,
    datastores: Sub<DatastoreConfig, C>,
    downloads: Sub<DownloaderStatus, C>,
    cert_downloads: Sub<DownloaderStatus, C>,
    verifications: Sub<VerifyImageStatus, C>,
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
            certs: bus
                .subscribe(AgentName::Zedagent, None)?
                .on_modify(handle_cert_modify)
                .on_delete(handle_cert_delete)
                .on_synchronized(handle_cert_synchronized),
            datastores: bus
                .subscribe(AgentName::Zedagent, None)?
                .on_modify(handle_datastore_modify),
            downloads: bus
                .subscribe(AgentName::Downloader, Some(ObjType::BaseOs))?
                .on_modify(handle_download_status)
                .on_delete(handle_download_status),
            cert_downloads: bus
                .subscribe(AgentName::Downloader, Some(ObjType::Cert))?
                .on_modify(handle_cert_download_status)
                .on_delete(handle_cert_download_status),
            verifications: bus
                .subscribe(AgentName::Verifier, Some(ObjType::BaseOs))?
                .on_modify(handle_verify_status)
                .on_delete(handle_verify_status),
        })
    }

    /// Everything but the verifier statuses, which gate startup.
    fn activate_rest(&mut self) {
        self.datastores.activate();
        self.downloads.activate();
        self.cert_downloads.activate();
        self.configs.activate();
        self.certs.activate();
    }
}

impl<C: Clock> BaseOsContext<C> {
    fn new(bus: &Bus, paths: Paths, clock: C, subs: &Subs<C>) -> Result<Self, BusError> {
        Ok(Self {
            clock,
            paths,
            zboot: Zboot::open(bus)?,
            statuses: bus.publication(AGENT, None)?,
            cert_statuses: bus.publication(AGENT, None)?,
            downloads: bus.publication(AGENT, Some(ObjType::BaseOs))?,
            cert_downloads: bus.publication(AGENT, Some(ObjType::Cert))?,
            verifications: bus.publication(AGENT, Some(ObjType::BaseOs))?,
            configs: subs.configs.view(),
            cert_configs: subs.certs.view(),
            datastores: subs.datastores.view(),
            download_status: subs.downloads.view(),
            cert_download_status: subs.cert_downloads.view(),
            verify_status: subs.verifications.view(),
        })
    }

    /// Re-run every base OS but `except`; activation conflicts span configs.
    fn refresh_others(&mut self, except: &str) -> HandlerResult {
        let keys: Vec<String> =
            self.statuses.get_all().into_keys().filter(|k| k != except).collect();
        for key in keys {
            self.refresh(&key)?;
        }
        Ok(())
    }

    fn refresh(&mut self, key: &str) -> HandlerResult {
        let (Some(config), Some(mut status)) = (self.configs.get(key), self.statuses.get(key))
        else {
            return Ok(());
        };
        self.update_base_os(key, &config, &mut status)?;
        self.statuses.publish(key, &status)?;
        self.sync_refs()
    }

    fn refresh_cert(&mut self, key: &str) -> HandlerResult {
        let Some(mut status) = self.cert_statuses.get(key) else {
            return Ok(());
        };
        self.update_cert(&mut status);
        self.cert_statuses.publish(key, &status)?;
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

    fn refresh_cert_artifact(&mut self, safename: &str) -> HandlerResult {
        let affected: Vec<String> = self
            .cert_statuses
            .get_all()
            .into_iter()
            .filter(|(_, s)| s.storage_status_list.iter().any(|ss| ss.safename() == safename))
            .map(|(key, _)| key)
            .collect();
        for key in affected {
            self.refresh_cert(&key)?;
        }
        Ok(())
    }

    /// Retry base OS and cert objects that were waiting for `datastore`.
    pub fn check_and_recreate(&mut self, datastore: &Uuid) -> Result<usize, BusError> {
        let waiting = |list: &[StorageStatus]| list.iter().any(|ss| ss.datastore_id == *datastore);
        let base: Vec<String> = self
            .statuses
            .get_all()
            .into_iter()
            .filter(|(_, s)| s.missing_datastore && waiting(&s.storage_status_list))
            .map(|(key, _)| key)
            .collect();
        let certs: Vec<String> = self
            .cert_statuses
            .get_all()
            .into_iter()
            .filter(|(_, s)| s.missing_datastore && waiting(&s.storage_status_list))
            .map(|(key, _)| key)
            .collect();
        for key in &base {
            tracing::info!(key, %datastore, "datastore arrived; recreating base OS");
            self.refresh(key)?;
        }
        for key in &certs {
            tracing::info!(key, %datastore, "datastore arrived; recreating cert object");
            self.refresh_cert(key)?;
        }
        Ok(base.len() + certs.len())
    }

    fn datastores_missing(&self, list: &[StorageStatus]) -> bool {
        let mut missing = false;
        for ss in list {
            if self.datastores.get(&ss.datastore_id.to_string()).is_none() {
                tracing::info!(
                    datastore = %ss.datastore_id,
                    safename = %ss.safename(),
                    "datastore not yet known"
                );
                missing = true;
            }
        }
        missing
    }

    /// Bring downloader and verifier configs in line with the references
    /// held by base OS and cert statuses.
    fn sync_refs(&self) -> HandlerResult {
        let mut downloads = RefTally::default();
        let mut verifications = RefTally::default();
        for status in self.statuses.get_all().values() {
            for ss in &status.storage_status_list {
                if ss.has_downloader_ref {
                    downloads.hold(ss, true);
                }
                if ss.has_verifier_ref {
                    verifications.hold(ss, true);
                }
            }
        }
        let mut cert_downloads = RefTally::default();
        for status in self.cert_statuses.get_all().values() {
            for ss in status.storage_status_list.iter().filter(|ss| ss.has_downloader_ref) {
                cert_downloads.hold(ss, true);
            }
        }
        refs::sync_downloads(&self.downloads, ObjType::BaseOs, &downloads, &self.datastores)?;
        refs::sync_downloads(
            &self.cert_downloads,
            ObjType::Cert,
            &cert_downloads,
            &self.datastores,
        )?;
        refs::sync_verifications(&self.verifications, ObjType::BaseOs, &verifications)
    }
}

/// Move one image forward from its downloader status and, when `verifier`
/// is given, its verifier status.
fn advance_storage(
    ss: &mut StorageStatus,
    downloads: &SubView<DownloaderStatus>,
    verifier: Option<&SubView<VerifyImageStatus>>,
) {
    let name = ss.safename();
    if let Some(vs) =
        verifier.and_then(|v| v.get(&name)).filter(|vs| vs.state == SwState::Delivered)
    {
        ss.has_verifier_ref = true;
        ss.has_downloader_ref = true;
        ss.state = SwState::Delivered;
        ss.progress = 100;
        ss.active_file = vs.verified_path;
        ss.error.clear();
        ss.error_time_ms = 0;
        return;
    }

    ss.has_downloader_ref = true;
    let Some(ds) = downloads.get(&name) else {
        return;
    };
    ss.progress = ds.progress;
    ss.error = ds.last_err;
    ss.error_time_ms = ds.last_err_time_ms;
    if ds.state < SwState::Downloaded {
        ss.state = ds.state;
        return;
    }
    ss.state = SwState::Downloaded;
    if let Some(verifier) = verifier {
        ss.has_verifier_ref = true;
        if let Some(vs) = verifier.get(&name).filter(|vs| !vs.last_err.is_empty()) {
            ss.error = vs.last_err;
            ss.error_time_ms = vs.last_err_time_ms;
        }
    }
}

/// Per-image errors joined into one, stamped with the latest time.
fn storage_error(list: &[StorageStatus]) -> Option<(String, u64)> {
    let errors: Vec<&str> =
        list.iter().map(|ss| ss.error.as_str()).filter(|e| !e.is_empty()).collect();
    if errors.is_empty() {
        return None;
    }
    let time = list.iter().map(|ss| ss.error_time_ms).max().unwrap_or_default();
    Some((errors.join("; "), time))
}

fn min_state(list: &[StorageStatus]) -> SwState {
    if list.is_empty() {
        SwState::Delivered
    } else {
        SwState::min_of(list.iter().map(|ss| ss.state))
    }
}

fn release_refs(list: &mut [StorageStatus]) {
    for ss in list {
        ss.has_downloader_ref = false;
        ss.has_verifier_ref = false;
    }
}

/// Keep entries already tracked for the same artifact.
fn rebuild_storage(previous: Vec<StorageStatus>, configs: &[StorageConfig]) -> Vec<StorageStatus> {
    configs
        .iter()
        .map(|sc| {
            let fresh = StorageStatus::from_config(sc);
            previous.iter().find(|old| old.safename() == fresh.safename()).cloned().unwrap_or(fresh)
        })
        .collect()
}

fn handle_config_modify<C: Clock>(
    ctx: &mut BaseOsContext<C>,
    key: &str,
    config: &BaseOsConfig,
) -> HandlerResult {
    match ctx.statuses.get(key) {
        Some(status) => ctx.modify_base_os(key, config, status)?,
        None => ctx.create_base_os(key, config)?,
    }
    ctx.refresh_others(key)
}

fn handle_config_delete<C: Clock>(
    ctx: &mut BaseOsContext<C>,
    key: &str,
    _config: &BaseOsConfig,
) -> HandlerResult {
    ctx.delete_base_os(key)?;
    ctx.refresh_others(key)
}

fn handle_config_restarted<C: Clock>(ctx: &mut BaseOsContext<C>, done: bool) -> HandlerResult {
    if done {
        ctx.statuses.signal_restarted();
    }
    Ok(())
}

fn handle_config_synchronized<C: Clock>(ctx: &mut BaseOsContext<C>, _done: bool) -> HandlerResult {
    for key in ctx.statuses.get_all().into_keys() {
        if ctx.configs.get(&key).is_none() {
            tracing::info!(key, "removing orphaned base OS status");
            ctx.delete_base_os(&key)?;
        }
    }
    Ok(())
}

fn handle_cert_modify<C: Clock>(
    ctx: &mut BaseOsContext<C>,
    key: &str,
    config: &CertObjConfig,
) -> HandlerResult {
    match ctx.cert_statuses.get(key) {
        Some(status) => ctx.modify_cert(key, config, status),
        None => ctx.create_cert(key, config),
    }
}

fn handle_cert_delete<C: Clock>(
    ctx: &mut BaseOsContext<C>,
    key: &str,
    _config: &CertObjConfig,
) -> HandlerResult {
    ctx.delete_cert(key)
}

fn handle_cert_synchronized<C: Clock>(ctx: &mut BaseOsContext<C>, _done: bool) -> HandlerResult {
    for key in ctx.cert_statuses.get_all().into_keys() {
        if ctx.cert_configs.get(&key).is_none() {
            tracing::info!(key, "removing orphaned cert status");
            ctx.delete_cert(&key)?;
        }
    }
    Ok(())
}

fn handle_datastore_modify<C: Clock>(
    ctx: &mut BaseOsContext<C>,
    _key: &str,
    datastore: &DatastoreConfig,
) -> HandlerResult {
    ctx.check_and_recreate(&datastore.uuid)?;
    Ok(())
}

fn handle_download_status<C: Clock>(
    ctx: &mut BaseOsContext<C>,
    key: &str,
    _status: &DownloaderStatus,
) -> HandlerResult {
    ctx.refresh_artifact(key)
}

fn handle_cert_download_status<C: Clock>(
    ctx: &mut BaseOsContext<C>,
    key: &str,
    _status: &DownloaderStatus,
) -> HandlerResult {
    ctx.refresh_cert_artifact(key)
}

fn handle_verify_status<C: Clock>(
    ctx: &mut BaseOsContext<C>,
    key: &str,
    _status: &VerifyImageStatus,
) -> HandlerResult {
    ctx.refresh_artifact(key)
}

/// Run the base-OS manager until cancelled. Like the app-instance manager
/// it starts only once the verifier has republished its images.
pub async fn run<C: Clock>(
    deps: AgentDeps<C>,
    cancel: CancellationToken,
) -> Result<(), AgentError> {
    let heartbeat = deps.heartbeat(AGENT);
    let mut subs = Subs::new(&deps.bus)?;
    let mut ctx = BaseOsContext::new(&deps.bus, deps.paths.clone(), deps.clock.clone(), &subs)?;
    ctx.statuses.clear_restarted();

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
    tracing::info!("verifier restarted; starting base OS manager");
    subs.activate_rest();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            change = subs.configs.recv() => subs.configs.process_change(change, &mut ctx)?,
            change = subs.certs.recv() => subs.certs.process_change(change, &mut ctx)?,
            change = subs.datastores.recv() => subs.datastores.process_change(change, &mut ctx)?,
            change = subs.downloads.recv() => subs.downloads.process_change(change, &mut ctx)?,
            change = subs.cert_downloads.recv() => {
                subs.cert_downloads.process_change(change, &mut ctx)?
            }
            change = subs.verifications.recv() => {
                subs.verifications.process_change(change, &mut ctx)?
            }
            _ = ticker.tick() => heartbeat.touch(),
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
