// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One artifact's worker. It owns the artifact's `DownloaderStatus`; nothing
//! else publishes it while the worker is live.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ef_bus::Publication;
use ef_core::{round_up_kb, Clock, DownloaderConfig, DownloaderStatus, SwState};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};

use super::dispatch::WorkerMsg;
use super::transfer::{scheme_of, TransferError, TransferRequest};
use super::Shared;

/// Mailbox loop for one dispatch key.
pub(crate) async fn run<C: Clock>(
    shared: Arc<Shared<C>>,
    key: String,
    mut rx: mpsc::UnboundedReceiver<WorkerMsg<DownloaderConfig>>,
) {
    let mut settings = shared.settings.subscribe();
    let mut retry = retry_ticker(settings.borrow_and_update().retry_period());
    let mut worker = Worker::new(shared, key);
    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(WorkerMsg::Update(config)) => worker.handle_update(config).await,
                Some(WorkerMsg::Expire) => worker.handle_expire(),
                Some(WorkerMsg::Shutdown) => {
                    worker.handle_delete();
                    return;
                }
                // Agent stopping; status stays in the bus for the next run.
                None => return,
            },
            _ = retry.tick() => worker.maybe_retry().await,
            Ok(()) = settings.changed() => {
                let period = settings.borrow_and_update().retry_period();
                if period != retry.period() {
                    retry = retry_ticker(period);
                }
            }
        }
    }
}

fn retry_ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

pub(crate) struct Worker<C: Clock> {
    shared: Arc<Shared<C>>,
    key: String,
    config: Option<DownloaderConfig>,
    status: Option<DownloaderStatus>,
}

impl<C: Clock> Worker<C> {
    pub(crate) fn new(shared: Arc<Shared<C>>, key: String) -> Self {
        Self { shared, key, config: None, status: None }
    }

    pub(crate) fn status(&self) -> Option<&DownloaderStatus> {
        self.status.as_ref()
    }

    fn publication(&self, config: &DownloaderConfig) -> &Publication<DownloaderStatus> {
        self.shared.statuses.for_type(config.obj_type)
    }

    fn publish(&self, config: &DownloaderConfig, status: &DownloaderStatus) {
        if let Err(e) = self.publication(config).publish(&status.safename, status) {
            tracing::error!(key = %self.key, error = %e, "failed to publish download status");
        }
    }

    fn pending_file(&self, config: &DownloaderConfig) -> PathBuf {
        self.shared.paths.pending_file(config.obj_type, &config.image_sha256, &config.safename)
    }

    pub(crate) async fn handle_update(&mut self, config: DownloaderConfig) {
        let status = match self.status.take() {
            Some(status) => Some(status),
            None => self
                .publication(&config)
                .get(&config.safename)
                .and_then(|existing| self.adopt(&config, existing)),
        };
        let url_kept = status.as_ref().map_or(true, |s| s.download_url == config.download_url);
        let status = match status {
            Some(status) => self.modify(status, &config).await,
            None => self.create(&config).await,
        };
        if url_kept || self.config.is_none() {
            self.config = Some(config);
        }
        self.status = Some(status);
    }

    /// Take over a status left by an earlier run of the agent. Completed
    /// downloads are kept; anything in flight is started over.
    fn adopt(
        &self,
        config: &DownloaderConfig,
        mut existing: DownloaderStatus,
    ) -> Option<DownloaderStatus> {
        let pending = self.pending_file(config);
        if existing.state != SwState::Downloaded {
            tracing::info!(
                key = %self.key,
                state = %existing.state,
                "restarting interrupted download"
            );
            // A partial file was counted as used when the quota was measured.
            self.shared.quota.free(remove_counted(&pending));
            return None;
        }
        // Only pending files are measured at start; bytes already handed to
        // the verifier are still this status's to account for.
        if !pending.exists() {
            self.shared.quota.claim(round_up_kb(existing.size));
        }
        existing.reserved_space_kb = 0;
        Some(existing)
    }

    async fn create(&self, config: &DownloaderConfig) -> DownloaderStatus {
        let now = self.shared.clock.epoch_ms();
        let mut status = DownloaderStatus::from_config(config, now);
        if let Some(size) = self.verified_size(config) {
            return self.claim_verified(config, status, size);
        }
        // Left by a transfer cut short by a daemon stop; counted when measured.
        self.shared.quota.free(remove_counted(&self.pending_file(config)));
        self.publish(config, &status);

        if config.ref_count == 0 {
            tracing::info!(key = %self.key, "RefCount==0; download deferred");
            status.record_error(
                format!("RefCount==0; download deferred for {}", config.download_url),
                now,
            );
            status.pending_add = false;
            self.publish(config, &status);
            return status;
        }
        match self.reserve(config, status) {
            Ok(status) => self.sync(config, status).await,
            Err(status) => status,
        }
    }

    fn verified_size(&self, config: &DownloaderConfig) -> Option<u64> {
        let path = self.shared.paths.verified_file(
            config.obj_type,
            &config.image_sha256,
            &config.safename,
        );
        std::fs::metadata(path).ok().filter(|m| m.is_file()).map(|m| m.len())
    }

    /// Take ownership of an image the verifier already holds, with no transfer.
    fn claim_verified(
        &self,
        config: &DownloaderConfig,
        mut status: DownloaderStatus,
        size: u64,
    ) -> DownloaderStatus {
        self.shared.quota.claim(round_up_kb(size));
        status.size = size;
        status.state = SwState::Downloaded;
        status.progress = 100;
        status.pending_add = false;
        tracing::info!(key = %self.key, size, "image already verified");
        self.publish(config, &status);
        status
    }

    /// Reserve the expected size. On refusal the status records the error
    /// and comes back as `Err`.
    fn reserve(
        &self,
        config: &DownloaderConfig,
        mut status: DownloaderStatus,
    ) -> Result<DownloaderStatus, DownloaderStatus> {
        let kb = round_up_kb(config.size);
        match self.shared.quota.try_reserve(kb) {
            Ok(()) => {
                status.reserved_space_kb = kb;
                self.publish(config, &status);
                Ok(status)
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "no space for download");
                status.record_error(e.to_string(), self.shared.clock.epoch_ms());
                status.pending_add = false;
                self.publish(config, &status);
                Err(status)
            }
        }
    }

    async fn sync(
        &self,
        config: &DownloaderConfig,
        mut status: DownloaderStatus,
    ) -> DownloaderStatus {
        status.state = SwState::DownloadStarted;
        self.publish(config, &status);

        let dest = self.pending_file(config);
        let network = self.shared.network.read().clone();
        let count = if config.use_free_mgmt_ports {
            network.count_local_addr_free_no_link_local()
        } else {
            network.count_local_addr_any_no_link_local()
        };
        if count == 0 {
            return self.fail(
                config,
                status,
                &dest,
                "No IP management port addresses for download".to_string(),
            );
        }

        let mut last_err = String::new();
        for index in 0..count {
            let source = if config.use_free_mgmt_ports {
                network.local_addr_free_no_link_local(index)
            } else {
                network.local_addr_any_no_link_local(index)
            };
            let Some(source) = source else { continue };
            let req = TransferRequest {
                scheme: scheme_of(&config.transport, &config.download_url),
                url: config.download_url.clone(),
                dpath: config.dpath.clone(),
                api_key: config.api_key.clone(),
                password: config.password.clone(),
                size_limit: status.reserved_space_kb * 1024,
                source,
                dest: dest.clone(),
            };
            match self.fetch(config, &mut status, &req).await {
                Ok(()) => return self.complete(config, status, &dest).await,
                Err(e) => {
                    let port = network.mgmt_port_for(source).unwrap_or("?");
                    tracing::warn!(
                        key = %self.key,
                        %source,
                        port,
                        error = %e,
                        "download attempt failed"
                    );
                    last_err = format!("{} via {}: {}", config.download_url, port, e);
                }
            }
        }
        self.fail(config, status, &dest, last_err)
    }

    /// One transfer attempt, republishing progress as whole percents change.
    async fn fetch(
        &self,
        config: &DownloaderConfig,
        status: &mut DownloaderStatus,
        req: &TransferRequest,
    ) -> Result<(), TransferError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transfer = Arc::clone(&self.shared.transfer);
        let fut = transfer.fetch(req, tx);
        tokio::pin!(fut);
        loop {
            tokio::select! {
                result = &mut fut => return result,
                Some(progress) = rx.recv() => {
                    let percent = progress.percent();
                    if percent != status.progress {
                        status.progress = percent;
                        self.publish(config, status);
                    }
                }
            }
        }
    }

    async fn complete(
        &self,
        config: &DownloaderConfig,
        mut status: DownloaderStatus,
        dest: &Path,
    ) -> DownloaderStatus {
        let size = match tokio::fs::metadata(dest).await {
            Ok(meta) => meta.len(),
            Err(e) => return self.fail(config, status, dest, format!("{}: {}", dest.display(), e)),
        };
        let reserved = std::mem::take(&mut status.reserved_space_kb);
        if let Err(e) = self.shared.quota.commit(reserved, round_up_kb(size)) {
            remove_counted(dest);
            return self.fail(config, status, dest, e.to_string());
        }
        let now = self.shared.clock.epoch_ms();
        status.size = size;
        status.state = SwState::Downloaded;
        status.progress = 100;
        status.mod_time_ms = now;
        status.pending_add = false;
        status.clear_error();
        tracing::info!(key = %self.key, size, "download complete");
        self.publish(config, &status);
        status
    }

    fn fail(
        &self,
        config: &DownloaderConfig,
        mut status: DownloaderStatus,
        dest: &Path,
        err: String,
    ) -> DownloaderStatus {
        tracing::error!(key = %self.key, error = %err, "download failed");
        remove_counted(dest);
        self.shared.quota.release(std::mem::take(&mut status.reserved_space_kb));
        status.state = SwState::Initial;
        status.progress = 0;
        status.pending_add = false;
        status.record_error(err, self.shared.clock.epoch_ms());
        self.publish(config, &status);
        status
    }

    async fn modify(
        &self,
        mut status: DownloaderStatus,
        config: &DownloaderConfig,
    ) -> DownloaderStatus {
        if config.download_url != status.download_url {
            tracing::error!(
                key = %self.key,
                from = %status.download_url,
                to = %config.download_url,
                "URL changes are not supported"
            );
            return status;
        }
        if config.image_sha256 != status.image_sha256 || !status.last_err.is_empty() {
            tracing::info!(key = %self.key, last_err = %status.last_err, "recreating download");
            self.teardown(config, &mut status);
            return self.create(config).await;
        }
        if status.ref_count == 0 && config.ref_count > 0 && status.state != SwState::Downloaded {
            self.teardown(config, &mut status);
            return self.create(config).await;
        }
        status.ref_count = config.ref_count;
        status.use_free_mgmt_ports = config.use_free_mgmt_ports;
        status.last_use_ms = self.shared.clock.epoch_ms();
        status.expired = false;
        self.publish(config, &status);
        status
    }

    /// Give back every byte this artifact holds and delete its pending file.
    /// A downloaded artifact owns its size until here, even after the verifier
    /// moved the file. Zeroed fields make a second call harmless.
    fn teardown(&self, config: &DownloaderConfig, status: &mut DownloaderStatus) {
        self.shared.quota.release(std::mem::take(&mut status.reserved_space_kb));
        let pending =
            self.shared.paths.pending_file(config.obj_type, &status.image_sha256, &status.safename);
        remove_counted(&pending);
        if status.state == SwState::Downloaded {
            self.shared.quota.free(round_up_kb(std::mem::take(&mut status.size)));
        }
        status.size = 0;
        status.state = SwState::Initial;
        status.progress = 0;
    }

    pub(crate) fn handle_delete(&mut self) {
        let (Some(config), Some(mut status)) = (self.config.take(), self.status.take()) else {
            return;
        };
        tracing::info!(key = %self.key, "deleting download");
        self.teardown(&config, &mut status);
        if let Err(e) = self.publication(&config).unpublish(&status.safename) {
            tracing::error!(key = %self.key, error = %e, "failed to unpublish download status");
        }
    }

    /// Mark unreferenced, idle artifacts. The consumer issues the delete.
    pub(crate) fn handle_expire(&mut self) {
        let gc_time = self.shared.settings.borrow().gc_time;
        let (Some(config), Some(status)) = (self.config.as_ref(), self.status.as_mut()) else {
            return;
        };
        if status.ref_count != 0
            || status.expired
            || self.shared.clock.since_ms(status.last_use_ms) < gc_time
        {
            return;
        }
        tracing::info!(key = %self.key, "download expired");
        status.expired = true;
        let status = status.clone();
        self.publish(config, &status);
    }

    /// Retry a failed download once its error is older than the retry time.
    pub(crate) async fn maybe_retry(&mut self) {
        let retry_time = self.shared.settings.borrow().retry_time;
        let (Some(config), Some(status)) = (self.config.clone(), self.status.as_ref()) else {
            return;
        };
        if status.last_err.is_empty() || config.ref_count == 0 {
            return;
        }
        if self.shared.clock.since_ms(status.last_err_time_ms) < retry_time {
            return;
        }
        let Some(mut status) = self.status.take() else { return };
        tracing::info!(key = %self.key, retry_count = status.retry_count, "retrying download");
        status.clear_error();
        let status = match self.reserve(&config, status) {
            Ok(status) => self.sync(&config, status).await,
            Err(status) => status,
        };
        self.status = Some(status);
    }
}

/// Delete `path` if present, returning the kilobytes it occupied.
pub(crate) fn remove_counted(path: &Path) -> u64 {
    let kb = std::fs::metadata(path).map(|m| round_up_kb(m.len())).unwrap_or(0);
    match std::fs::remove_file(path) {
        Ok(()) => kb,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove download");
            0
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
