// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Verifier agent: hashes downloaded images, moves good ones into the
//! verified tree and reports the result per safename.
//!
//! On start it republishes every image already in `verified/` with
//! `RefCount == 0` before signalling restarted, so consumers that wait for
//! that signal find their images without downloading them again.

use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ef_bus::{HandlerResult, Publication, SubView, Subscription};
use ef_core::{
    safename, AgentName, Clock, GlobalConfig, ObjType, Paths, SwState, VerifyImageConfig,
    VerifyImageStatus,
};
use sha2::{Digest, Sha256};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::agents::AgentDeps;
use crate::error::AgentError;

const AGENT: AgentName = AgentName::Verifier;

/// Scopes that carry images. Certificates are never verified.
pub const SCOPES: [ObjType; 2] = [ObjType::AppImg, ObjType::BaseOs];

/// SHA-256 of a file as lowercase hex.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Settings {
    gc_time: Duration,
    retry_time: Duration,
}

impl From<&GlobalConfig> for Settings {
    fn from(config: &GlobalConfig) -> Self {
        Self { gc_time: config.download_gc_time(), retry_time: config.verify_retry_time() }
    }
}

/// Result of one hashing job, handed back to the agent loop.
#[derive(Debug)]
struct Verdict {
    obj_type: ObjType,
    safename: String,
    outcome: Result<(u64, PathBuf), String>,
}

/// Hash `pending`, then move it to `verified` on a match. A mismatching
/// file is deleted so the next attempt starts from a fresh download.
fn verify(pending: &Path, verified: &Path, expected: &str) -> Result<(u64, PathBuf), String> {
    let actual = sha256_file(pending).map_err(|e| format!("{}: {}", pending.display(), e))?;
    if !actual.eq_ignore_ascii_case(expected) {
        if let Err(e) = std::fs::remove_file(pending) {
            tracing::warn!(
                path = %pending.display(),
                error = %e,
                "failed to remove mismatching image"
            );
        }
        return Err(format!(
            "computed sha256 {} does not match expected {}",
            actual,
            expected.to_lowercase()
        ));
    }
    let size =
        std::fs::metadata(pending).map_err(|e| format!("{}: {}", pending.display(), e))?.len();
    if let Some(dir) = verified.parent() {
        std::fs::create_dir_all(dir).map_err(|e| format!("{}: {}", dir.display(), e))?;
    }
    std::fs::rename(pending, verified)
        .map_err(|e| format!("move to {}: {}", verified.display(), e))?;
    Ok((size, verified.to_path_buf()))
}

fn job_key(obj_type: ObjType, safename: &str) -> String {
    format!("{}/{}", obj_type, safename)
}

pub struct VerifierContext<C: Clock> {
    clock: C,
    paths: Paths,
    app: Publication<VerifyImageStatus>,
    base: Publication<VerifyImageStatus>,
    configs: Vec<(ObjType, SubView<VerifyImageConfig>)>,
    settings: Settings,
    jobs: JoinSet<Verdict>,
    in_flight: HashSet<String>,
}

impl<C: Clock> VerifierContext<C> {
    fn publication(&self, obj_type: ObjType) -> &Publication<VerifyImageStatus> {
        match obj_type {
            ObjType::BaseOs => &self.base,
            _ => &self.app,
        }
    }

    fn config(&self, obj_type: ObjType, safename: &str) -> Option<VerifyImageConfig> {
        self.configs.iter().find(|(t, _)| *t == obj_type).and_then(|(_, view)| view.get(safename))
    }

    /// Publish statuses for images verified in an earlier run.
    fn adopt_verified(&self) -> Result<usize, AgentError> {
        let mut adopted = 0;
        for obj_type in SCOPES {
            let publication = self.publication(obj_type);
            for (sha, file, path) in verified_files(&self.paths.verified_dir(obj_type))? {
                let name = safename(&file, &sha);
                if publication.get(&name).is_some() {
                    continue;
                }
                let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                let status = VerifyImageStatus {
                    safename: name.clone(),
                    obj_type,
                    image_sha256: sha,
                    ref_count: 0,
                    state: SwState::Delivered,
                    pending_add: false,
                    size,
                    verified_path: path.display().to_string(),
                    last_use_ms: self.clock.epoch_ms(),
                    expired: false,
                    last_err: String::new(),
                    last_err_time_ms: 0,
                };
                publication.publish(&name, &status)?;
                adopted += 1;
            }
        }
        Ok(adopted)
    }

    fn start(
        &mut self,
        config: &VerifyImageConfig,
        mut status: VerifyImageStatus,
    ) -> HandlerResult {
        let key = job_key(config.obj_type, &config.safename);
        status.pending_add = true;
        self.publication(config.obj_type).publish(&config.safename, &status)?;
        if !self.in_flight.insert(key) {
            return Ok(());
        }
        let pending =
            self.paths.pending_file(config.obj_type, &config.image_sha256, &config.safename);
        let verified =
            self.paths.verified_file(config.obj_type, &config.image_sha256, &config.safename);
        let expected = config.image_sha256.clone();
        let (obj_type, name) = (config.obj_type, config.safename.clone());
        tracing::info!(obj_type = %obj_type, safename = %name, "verifying");
        self.jobs.spawn_blocking(move || Verdict {
            obj_type,
            safename: name,
            outcome: verify(&pending, &verified, &expected),
        });
        Ok(())
    }

    fn finish(&mut self, verdict: Verdict) -> HandlerResult {
        self.in_flight.remove(&job_key(verdict.obj_type, &verdict.safename));
        let publication = self.publication(verdict.obj_type).clone();
        let Some(mut status) = publication.get(&verdict.safename) else {
            // Config deleted while hashing
            if let Ok((_, path)) = verdict.outcome {
                remove_verified(&path);
            }
            return Ok(());
        };
        let now = self.clock.epoch_ms();
        status.pending_add = false;
        match verdict.outcome {
            Ok((size, path)) => {
                tracing::info!(safename = %verdict.safename, size, "verified");
                status.state = SwState::Delivered;
                status.size = size;
                status.verified_path = path.display().to_string();
                status.last_err.clear();
                status.last_err_time_ms = 0;
            }
            Err(e) => {
                tracing::error!(safename = %verdict.safename, error = %e, "verification failed");
                status.state = SwState::Initial;
                status.last_err = e;
                status.last_err_time_ms = now;
            }
        }
        publication.publish(&verdict.safename, &status)
    }

    /// Re-attempt failed verifications whose image has been fetched again.
    fn retry_failed(&mut self) -> HandlerResult {
        for obj_type in SCOPES {
            for (name, status) in self.publication(obj_type).get_all() {
                if status.last_err.is_empty() || status.pending_add {
                    continue;
                }
                if self.clock.since_ms(status.last_err_time_ms) < self.settings.retry_time {
                    continue;
                }
                let Some(config) = self.config(obj_type, &name).filter(|c| c.ref_count > 0) else {
                    continue;
                };
                if !self.paths.pending_file(obj_type, &config.image_sha256, &name).exists() {
                    continue;
                }
                tracing::info!(safename = %name, "retrying verification");
                self.start(&config, status)?;
            }
        }
        Ok(())
    }

    /// Drop unreferenced images nobody has configured past the GC horizon.
    fn collect_garbage(&mut self) -> HandlerResult {
        for obj_type in SCOPES {
            let publication = self.publication(obj_type).clone();
            for (name, status) in publication.get_all() {
                if status.ref_count > 0
                    || status.pending_add
                    || self.config(obj_type, &name).is_some()
                {
                    continue;
                }
                if self.clock.since_ms(status.last_use_ms) < self.settings.gc_time {
                    continue;
                }
                tracing::info!(safename = %name, "expiring unreferenced verified image");
                remove_verified(Path::new(&status.verified_path));
                publication.unpublish(&name)?;
            }
        }
        Ok(())
    }
}

fn remove_verified(path: &Path) {
    if path.as_os_str().is_empty() {
        return;
    }
    match std::fs::remove_file(path) {
        Ok(()) => {
            if let Some(dir) = path.parent() {
                let _ = std::fs::remove_dir(dir);
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove verified image"
        ),
    }
}

/// `(sha, file name, path)` for every file under `verified/<sha>/`.
fn verified_files(dir: &Path) -> io::Result<Vec<(String, String, PathBuf)>> {
    let mut found = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(found),
        Err(e) => return Err(e),
    };
    for sha_dir in entries {
        let sha_dir = sha_dir?;
        if !sha_dir.file_type()?.is_dir() {
            continue;
        }
        let sha = sha_dir.file_name().to_string_lossy().to_lowercase();
        for file in std::fs::read_dir(sha_dir.path())? {
            let file = file?;
            if file.file_type()?.is_file() {
                let name = file.file_name().to_string_lossy().into_owned();
                found.push((sha.clone(), name, file.path()));
            }
        }
    }
    Ok(found)
}

fn handle_config_modify<C: Clock>(
    ctx: &mut VerifierContext<C>,
    key: &str,
    config: &VerifyImageConfig,
) -> HandlerResult {
    let now = ctx.clock.epoch_ms();
    let existing = ctx.publication(config.obj_type).get(key);
    let status = match existing {
        Some(mut status) if status.image_sha256.eq_ignore_ascii_case(&config.image_sha256) => {
            status.ref_count = config.ref_count;
            status.last_use_ms = now;
            status.expired = false;
            if status.state == SwState::Delivered
                || status.pending_add
                || !status.last_err.is_empty()
            {
                return ctx.publication(config.obj_type).publish(key, &status);
            }
            status
        }
        _ => VerifyImageStatus {
            safename: config.safename.clone(),
            obj_type: config.obj_type,
            image_sha256: config.image_sha256.clone(),
            ref_count: config.ref_count,
            state: SwState::Initial,
            pending_add: false,
            size: 0,
            verified_path: String::new(),
            last_use_ms: now,
            expired: false,
            last_err: String::new(),
            last_err_time_ms: 0,
        },
    };
    if config.ref_count == 0 {
        return ctx.publication(config.obj_type).publish(key, &status);
    }
    ctx.start(config, status)
}

fn handle_config_delete<C: Clock>(
    ctx: &mut VerifierContext<C>,
    key: &str,
    config: &VerifyImageConfig,
) -> HandlerResult {
    let publication = ctx.publication(config.obj_type).clone();
    let Some(status) = publication.get(key) else {
        return Ok(());
    };
    tracing::info!(safename = key, "removing verified image");
    remove_verified(Path::new(&status.verified_path));
    publication.unpublish(key)
}

fn handle_global_config<C: Clock>(
    ctx: &mut VerifierContext<C>,
    _key: &str,
    config: &GlobalConfig,
) -> HandlerResult {
    ctx.settings = Settings::from(config);
    Ok(())
}

type Sub<T, C> = Subscription<T, VerifierContext<C>>;

fn config_sub<C: Clock>(
    deps: &AgentDeps<C>,
    owner: AgentName,
    obj_type: ObjType,
) -> Result<Sub<VerifyImageConfig, C>, AgentError> {
    Ok(deps
        .bus
        .subscribe(owner, Some(obj_type))?
        .on_modify(handle_config_modify)
        .on_delete(handle_config_delete))
}

/// Run the verifier until cancelled.
pub async fn run<C: Clock>(
    deps: AgentDeps<C>,
    cancel: CancellationToken,
) -> Result<(), AgentError> {
    let heartbeat = deps.heartbeat(AGENT);
    let mut sub_app = config_sub(&deps, AgentName::Zedmanager, ObjType::AppImg)?;
    let mut sub_base = config_sub(&deps, AgentName::Baseosmgr, ObjType::BaseOs)?;
    let mut sub_global: Sub<GlobalConfig, C> =
        deps.bus.subscribe(AgentName::Zedagent, None)?.on_modify(handle_global_config);

    let mut ctx = VerifierContext {
        clock: deps.clock.clone(),
        paths: deps.paths.clone(),
        app: deps.bus.publication(AGENT, Some(ObjType::AppImg))?,
        base: deps.bus.publication(AGENT, Some(ObjType::BaseOs))?,
        configs: vec![(ObjType::AppImg, sub_app.view()), (ObjType::BaseOs, sub_base.view())],
        settings: Settings::from(&GlobalConfig::default()),
        jobs: JoinSet::new(),
        in_flight: HashSet::new(),
    };

    ctx.app.clear_restarted();
    ctx.base.clear_restarted();
    let adopted = ctx.adopt_verified()?;
    tracing::info!(adopted, "verifier restarted");
    ctx.app.signal_restarted();
    ctx.base.signal_restarted();

    sub_app.activate();
    sub_base.activate();
    sub_global.activate();

    let mut heartbeat_ticker = heartbeat.ticker();
    let mut housekeeping = tokio::time::interval(Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            change = sub_app.recv() => sub_app.process_change(change, &mut ctx)?,
            change = sub_base.recv() => sub_base.process_change(change, &mut ctx)?,
            change = sub_global.recv() => sub_global.process_change(change, &mut ctx)?,
            Some(joined) = ctx.jobs.join_next() => match joined {
                Ok(verdict) => ctx.finish(verdict)?,
                Err(e) => return Err(AgentError::Fatal(format!("verification task failed: {}", e))),
            },
            _ = housekeeping.tick() => {
                ctx.retry_failed()?;
                ctx.collect_garbage()?;
            }
            _ = heartbeat_ticker.tick() => heartbeat.touch(),
        }
    }

    ctx.jobs.abort_all();
    Ok(())
}

#[cfg(test)]
#[path = "verifier_tests.rs"]
mod tests;
