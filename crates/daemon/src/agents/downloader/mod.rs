// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Downloader agent: materializes artifacts under a shared space quota,
//! one worker task per artifact.

mod dispatch;
mod gc;
mod quota;
pub mod transfer;
mod worker;

#[cfg(test)]
mod test_helpers;

pub use dispatch::{WorkerDispatch, WorkerMsg};
pub use quota::{measure_kb, SpaceQuota};
pub use transfer::{
    FileTransfer, TransferBackend, TransferError, TransferProgress, TransferRequest, TransferRouter,
};
#[cfg(any(test, feature = "test-support"))]
pub use transfer::{FakeOutcome, FakeTransfer};

use std::sync::Arc;
use std::time::Duration;

use ef_bus::{HandlerResult, Publication, SubView, Subscription};
use ef_core::{
    AgentName, Clock, DeviceNetworkStatus, DownloaderConfig, DownloaderStatus, GlobalConfig,
    GlobalDownloadConfig, GlobalDownloadStatus, ObjType, Paths, GLOBAL_KEY,
};
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::agents::AgentDeps;
use crate::error::AgentError;

const AGENT: AgentName = AgentName::Downloader;

/// Timing knobs taken from `GlobalConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub gc_time: Duration,
    pub retry_time: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from(&GlobalConfig::default())
    }
}

impl From<&GlobalConfig> for Settings {
    fn from(config: &GlobalConfig) -> Self {
        Self { gc_time: config.download_gc_time(), retry_time: config.download_retry_time() }
    }
}

impl Settings {
    /// How often expired entries are looked for
    pub fn gc_period(&self) -> Duration {
        (self.gc_time / 10).max(Duration::from_secs(1))
    }

    /// How often a worker checks whether its failure is old enough to retry
    pub fn retry_period(&self) -> Duration {
        (self.retry_time / 10).max(Duration::from_secs(1))
    }
}

/// The three status publications, one per object type.
#[derive(Clone)]
pub struct StatusPubs {
    app: Publication<DownloaderStatus>,
    base: Publication<DownloaderStatus>,
    cert: Publication<DownloaderStatus>,
}

impl StatusPubs {
    pub fn new(bus: &ef_bus::Bus) -> Result<Self, ef_bus::BusError> {
        Ok(Self {
            app: bus.publication(AGENT, Some(ObjType::AppImg))?,
            base: bus.publication(AGENT, Some(ObjType::BaseOs))?,
            cert: bus.publication(AGENT, Some(ObjType::Cert))?,
        })
    }

    pub fn for_type(&self, obj_type: ObjType) -> &Publication<DownloaderStatus> {
        match obj_type {
            ObjType::AppImg => &self.app,
            ObjType::BaseOs => &self.base,
            ObjType::Cert => &self.cert,
        }
    }

    pub fn all(&self) -> [(ObjType, &Publication<DownloaderStatus>); 3] {
        [(ObjType::AppImg, &self.app), (ObjType::BaseOs, &self.base), (ObjType::Cert, &self.cert)]
    }
}

/// State shared by the agent loop and every worker.
pub struct Shared<C: Clock> {
    pub clock: C,
    pub paths: Paths,
    pub quota: SpaceQuota,
    pub network: RwLock<DeviceNetworkStatus>,
    /// Workers watch this to pick up new retry times.
    pub settings: watch::Sender<Settings>,
    pub transfer: Arc<dyn TransferBackend>,
    pub statuses: StatusPubs,
}

impl<C: Clock> Shared<C> {
    pub fn new(
        deps: &AgentDeps<C>,
        transfer: Arc<dyn TransferBackend>,
        quota_status: Publication<GlobalDownloadStatus>,
    ) -> Result<Self, ef_bus::BusError> {
        Ok(Self {
            clock: deps.clock.clone(),
            paths: deps.paths.clone(),
            quota: SpaceQuota::new(quota_status),
            network: RwLock::new(DeviceNetworkStatus::default()),
            settings: watch::channel(Settings::default()).0,
            transfer,
            statuses: StatusPubs::new(&deps.bus)?,
        })
    }
}

/// Mailbox key: safenames are only unique within an object type.
pub fn dispatch_key(obj_type: ObjType, safename: &str) -> String {
    format!("{}/{}", obj_type, safename)
}

pub struct DownloaderContext<C: Clock> {
    shared: Arc<Shared<C>>,
    dispatch: WorkerDispatch<DownloaderConfig>,
    configs: Vec<(ObjType, SubView<DownloaderConfig>)>,
    gc_period_changed: bool,
}

impl<C: Clock> DownloaderContext<C> {
    fn ready(&self) -> bool {
        self.shared.network.read().count_local_addr_any_no_link_local() > 0
            && self.shared.quota.max_kb() > 0
    }

    fn start_worker(&mut self, config: DownloaderConfig) {
        let key = dispatch_key(config.obj_type, &config.safename);
        let shared = Arc::clone(&self.shared);
        let worker_key = key.clone();
        self.dispatch.update(&key, config, move |rx| worker::run(shared, worker_key, rx));
    }

    /// Statuses left behind by configs deleted while the agent was down.
    fn reconcile_orphans(&mut self) {
        for (obj_type, view) in &self.configs {
            if !view.synchronized() {
                continue;
            }
            let publication = self.shared.statuses.for_type(*obj_type);
            for (safename, status) in publication.get_all() {
                if view.get(&safename).is_some()
                    || self.dispatch.contains(&dispatch_key(*obj_type, &safename))
                {
                    continue;
                }
                tracing::info!(obj_type = %obj_type, safename, "removing download without config");
                let path =
                    self.shared.paths.pending_file(*obj_type, &status.image_sha256, &safename);
                self.shared.quota.free(worker::remove_counted(&path));
                if let Err(e) = publication.unpublish(&safename) {
                    tracing::error!(safename, error = %e, "failed to unpublish orphan");
                }
            }
        }
    }
}

fn handle_config_modify<C: Clock>(
    ctx: &mut DownloaderContext<C>,
    _key: &str,
    config: &DownloaderConfig,
) -> HandlerResult {
    ctx.start_worker(config.clone());
    Ok(())
}

fn handle_config_delete<C: Clock>(
    ctx: &mut DownloaderContext<C>,
    _key: &str,
    config: &DownloaderConfig,
) -> HandlerResult {
    let key = dispatch_key(config.obj_type, &config.safename);
    if !ctx.dispatch.contains(&key) {
        if ctx.shared.statuses.for_type(config.obj_type).get(&config.safename).is_none() {
            tracing::warn!(key, "delete for unknown download");
            return Ok(());
        }
        ctx.start_worker(config.clone());
    }
    ctx.dispatch.shutdown(&key);
    Ok(())
}

fn handle_config_synchronized<C: Clock>(
    ctx: &mut DownloaderContext<C>,
    _done: bool,
) -> HandlerResult {
    ctx.reconcile_orphans();
    Ok(())
}

fn handle_dns_modify<C: Clock>(
    ctx: &mut DownloaderContext<C>,
    key: &str,
    status: &DeviceNetworkStatus,
) -> HandlerResult {
    if key != GLOBAL_KEY {
        tracing::info!(key, "ignoring device network status");
        return Ok(());
    }
    if status.testing {
        tracing::info!("ignoring device network status while testing");
        return Ok(());
    }
    let mut current = ctx.shared.network.write();
    if *current == *status {
        return Ok(());
    }
    *current = status.clone();
    tracing::info!(
        addrs = current.count_local_addr_any_no_link_local(),
        "device network status changed"
    );
    Ok(())
}

fn handle_dns_delete<C: Clock>(
    ctx: &mut DownloaderContext<C>,
    key: &str,
    _status: &DeviceNetworkStatus,
) -> HandlerResult {
    if key == GLOBAL_KEY {
        *ctx.shared.network.write() = DeviceNetworkStatus::default();
    }
    Ok(())
}

fn handle_global_config<C: Clock>(
    ctx: &mut DownloaderContext<C>,
    _key: &str,
    config: &GlobalConfig,
) -> HandlerResult {
    let next = Settings::from(config);
    let mut gc_period_changed = false;
    ctx.shared.settings.send_if_modified(|settings| {
        if *settings == next {
            return false;
        }
        tracing::info!(
            gc_time = ?next.gc_time,
            retry_time = ?next.retry_time,
            "download timers changed"
        );
        gc_period_changed = settings.gc_time != next.gc_time;
        *settings = next;
        true
    });
    ctx.gc_period_changed |= gc_period_changed;
    Ok(())
}

fn handle_global_download_config<C: Clock>(
    ctx: &mut DownloaderContext<C>,
    _key: &str,
    config: &GlobalDownloadConfig,
) -> HandlerResult {
    if ctx.shared.quota.max_kb() != config.max_space_kb {
        tracing::info!(max_space_kb = config.max_space_kb, "download quota changed");
        ctx.shared.quota.set_max(config.max_space_kb);
    }
    Ok(())
}

type Sub<T, C> = Subscription<T, DownloaderContext<C>>;

fn config_sub<C: Clock>(
    deps: &AgentDeps<C>,
    owner: AgentName,
    obj_type: ObjType,
) -> Result<Sub<DownloaderConfig, C>, AgentError> {
    Ok(deps
        .bus
        .subscribe(owner, Some(obj_type))?
        .on_modify(handle_config_modify)
        .on_delete(handle_config_delete)
        .on_synchronized(handle_config_synchronized))
}

/// Run the downloader until cancelled.
pub async fn run<C: Clock>(
    deps: AgentDeps<C>,
    transfer: Arc<dyn TransferBackend>,
    cancel: CancellationToken,
) -> Result<(), AgentError> {
    let heartbeat = deps.heartbeat(AGENT);
    let quota_status = deps.bus.publication::<GlobalDownloadStatus>(AGENT, None)?;
    let shared = Arc::new(Shared::new(&deps, transfer, quota_status)?);

    let mut sub_app = config_sub(&deps, AgentName::Zedmanager, ObjType::AppImg)?;
    let mut sub_base = config_sub(&deps, AgentName::Baseosmgr, ObjType::BaseOs)?;
    let mut sub_cert = config_sub(&deps, AgentName::Baseosmgr, ObjType::Cert)?;
    let mut sub_dns: Sub<DeviceNetworkStatus, C> = deps
        .bus
        .subscribe(AgentName::Nim, None)?
        .on_modify(handle_dns_modify)
        .on_delete(handle_dns_delete);
    let mut sub_global: Sub<GlobalConfig, C> =
        deps.bus.subscribe(AgentName::Zedagent, None)?.on_modify(handle_global_config);
    let mut sub_global_download: Sub<GlobalDownloadConfig, C> =
        deps.bus.subscribe(AgentName::Zedagent, None)?.on_modify(handle_global_download_config);

    let mut ctx = DownloaderContext {
        shared: Arc::clone(&shared),
        dispatch: WorkerDispatch::new(),
        configs: vec![
            (ObjType::AppImg, sub_app.view()),
            (ObjType::BaseOs, sub_base.view()),
            (ObjType::Cert, sub_cert.view()),
        ],
        gc_period_changed: false,
    };

    // Status survives a task restart in the bus; there is nothing to recover.
    for (_, publication) in shared.statuses.all() {
        publication.clear_restarted();
        publication.signal_restarted();
    }

    for sub in [&mut sub_app, &mut sub_base, &mut sub_cert] {
        sub.activate();
    }
    sub_dns.activate();
    sub_global.activate();
    sub_global_download.activate();

    let mut heartbeat_ticker = heartbeat.ticker();
    while !ctx.ready() {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            change = sub_dns.recv() => sub_dns.process_change(change, &mut ctx)?,
            change = sub_global.recv() => sub_global.process_change(change, &mut ctx)?,
            change = sub_global_download.recv() => {
                sub_global_download.process_change(change, &mut ctx)?
            }
            _ = heartbeat_ticker.tick() => heartbeat.touch(),
        }
    }

    // Verified images are counted when a download claims them.
    let measured: u64 =
        ObjType::ALL.iter().map(|t| measure_kb(&shared.paths.pending_dir(*t))).sum();
    shared.quota.init(measured);
    tracing::info!(
        used_kb = shared.quota.status().used_space_kb,
        max_kb = shared.quota.max_kb(),
        "downloader ready"
    );

    let mut gc_ticker = tokio::time::interval(shared.settings.borrow().gc_period());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            change = sub_app.recv() => sub_app.process_change(change, &mut ctx)?,
            change = sub_base.recv() => sub_base.process_change(change, &mut ctx)?,
            change = sub_cert.recv() => sub_cert.process_change(change, &mut ctx)?,
            change = sub_dns.recv() => sub_dns.process_change(change, &mut ctx)?,
            change = sub_global.recv() => sub_global.process_change(change, &mut ctx)?,
            change = sub_global_download.recv() => {
                sub_global_download.process_change(change, &mut ctx)?
            }
            _ = gc_ticker.tick() => {
                for key in gc::expired_keys(&shared) {
                    if !ctx.dispatch.notify(&key, WorkerMsg::Expire) {
                        tracing::warn!(key, "expired download has no worker");
                    }
                }
            }
            _ = heartbeat_ticker.tick() => heartbeat.touch(),
        }
        if ctx.gc_period_changed {
            ctx.gc_period_changed = false;
            gc_ticker = tokio::time::interval(shared.settings.borrow().gc_period());
        }
    }

    ctx.dispatch.abort_all();
    Ok(())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
