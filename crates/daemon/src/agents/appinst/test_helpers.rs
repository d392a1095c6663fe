// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use ef_bus::{Bus, Publication};
use ef_core::test_support::{app_config, file_datastore, storage};
use ef_core::{
    AgentName, AppInstanceConfig, AppInstanceStatus, AppNetworkStatus, DatastoreConfig,
    DomainStatus, DownloaderConfig, DownloaderStatus, EidStatus, FakeClock, ObjType, SwState,
    VerifyImageStatus,
};
use uuid::Uuid;

use super::{AppInstContext, Subs};
use crate::agents::loopback::Acknowledge;

pub(super) const SHA_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub(super) const SHA_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
pub(super) const URL: &str = "file:///img/app.qcow2";

pub(super) fn app_uuid() -> Uuid {
    Uuid::from_u128(0xa1)
}

pub(super) fn datastore_uuid() -> Uuid {
    Uuid::from_u128(0xd5)
}

/// One-image instance on the fixture's datastore.
pub(super) fn app(activate: bool) -> AppInstanceConfig {
    let mut config = app_config(app_uuid(), vec![storage(datastore_uuid(), URL, SHA_A, 4096)]);
    config.activate = activate;
    config
}

/// The app-instance manager with its subscriptions, plus publications
/// standing in for every agent it talks to.
pub(super) struct Fixture {
    pub clock: FakeClock,
    pub subs: Subs<FakeClock>,
    pub ctx: AppInstContext<FakeClock>,
    pub configs: Publication<AppInstanceConfig>,
    pub datastores: Publication<DatastoreConfig>,
    pub download_status: Publication<DownloaderStatus>,
    pub verify_status: Publication<VerifyImageStatus>,
    pub eid_status: Publication<EidStatus>,
    pub network_status: Publication<AppNetworkStatus>,
    pub domain_status: Publication<DomainStatus>,
}

pub(super) fn fixture() -> Fixture {
    let mut f = fixture_on(Bus::in_memory());
    f.datastores.publish(&datastore_uuid().to_string(), &file_datastore(datastore_uuid())).unwrap();
    f.pump();
    f
}

/// Fixture over `bus` without any datastore.
pub(super) fn fixture_on(bus: Bus) -> Fixture {
    let clock = FakeClock::new();
    let mut subs = Subs::new(&bus).unwrap();
    let ctx = AppInstContext::new(&bus, clock.clone(), &subs).unwrap();
    subs.verifications.activate();
    subs.activate_rest();
    Fixture {
        clock,
        subs,
        ctx,
        configs: bus.publication(AgentName::Zedagent, None).unwrap(),
        datastores: bus.publication(AgentName::Zedagent, None).unwrap(),
        download_status: bus.publication(AgentName::Downloader, Some(ObjType::AppImg)).unwrap(),
        verify_status: bus.publication(AgentName::Verifier, Some(ObjType::AppImg)).unwrap(),
        eid_status: bus.publication(AgentName::Identitymgr, None).unwrap(),
        network_status: bus.publication(AgentName::Zedrouter, None).unwrap(),
        domain_status: bus.publication(AgentName::Domainmgr, None).unwrap(),
    }
}

/// Answer every config with its acknowledgement and drop stale answers.
fn mirror<Cfg: Acknowledge>(
    configs: &Publication<Cfg>,
    statuses: &Publication<Cfg::Status>,
) -> bool {
    let wanted = configs.get_all();
    let mut changed = false;
    for (key, config) in &wanted {
        let status = config.acknowledge();
        if statuses.get(key).as_ref() != Some(&status) {
            statuses.publish(key, &status).unwrap();
            changed = true;
        }
    }
    for key in statuses.get_all().into_keys() {
        if !wanted.contains_key(&key) {
            statuses.unpublish(&key).unwrap();
            changed = true;
        }
    }
    changed
}

impl Fixture {
    /// Deliver everything queued on every subscription.
    pub fn pump(&mut self) {
        loop {
            let s = &mut self.subs;
            let c = &mut self.ctx;
            let n = s.configs.drain(c).unwrap()
                + s.datastores.drain(c).unwrap()
                + s.downloads.drain(c).unwrap()
                + s.verifications.drain(c).unwrap()
                + s.eids.drain(c).unwrap()
                + s.networks.drain(c).unwrap()
                + s.domains.drain(c).unwrap();
            if n == 0 {
                return;
            }
        }
    }

    pub fn apply(&mut self, config: &AppInstanceConfig) {
        self.configs.publish(&config.uuid_and_version.key(), config).unwrap();
        self.pump();
    }

    pub fn status(&self) -> AppInstanceStatus {
        self.ctx.statuses.get(&app_uuid().to_string()).unwrap()
    }

    pub fn download_config(&self, sha: &str) -> Option<DownloaderConfig> {
        self.ctx.downloads.get_all().into_values().find(|c| c.image_sha256 == sha)
    }

    pub fn finish_download(&self, config: &DownloaderConfig) {
        let mut status = DownloaderStatus::from_config(config, 0);
        status.state = SwState::Downloaded;
        status.size = config.size;
        status.progress = 100;
        self.download_status.publish(&config.safename, &status).unwrap();
    }

    pub fn finish_verify(&self, safename: &str) {
        let config = self.ctx.verifications.get(safename).unwrap();
        let status = VerifyImageStatus {
            safename: safename.to_string(),
            obj_type: ObjType::AppImg,
            image_sha256: config.image_sha256,
            ref_count: config.ref_count,
            state: SwState::Delivered,
            pending_add: false,
            size: 4096,
            verified_path: format!("/verified/{}", safename),
            last_use_ms: 0,
            expired: false,
            last_err: String::new(),
            last_err_time_ms: 0,
        };
        self.verify_status.publish(safename, &status).unwrap();
    }

    /// Answer collaborator configs once, as the other agents would.
    pub fn ack(&mut self) -> bool {
        let mut changed = mirror(&self.ctx.eids, &self.eid_status);
        changed |= mirror(&self.ctx.networks, &self.network_status);
        changed |= mirror(&self.ctx.domains, &self.domain_status);
        self.pump();
        changed
    }

    /// Play every collaborator until nothing moves: referenced downloads
    /// finish, verifications succeed, collaborator configs are answered.
    pub fn settle(&mut self) {
        for _ in 0..20 {
            let mut changed = false;
            for (name, config) in self.ctx.downloads.get_all() {
                if config.ref_count > 0 && self.download_status.get(&name).is_none() {
                    self.finish_download(&config);
                    changed = true;
                }
            }
            for name in self.download_status.get_all().into_keys() {
                if self.ctx.downloads.get(&name).is_none() {
                    self.download_status.unpublish(&name).unwrap();
                    changed = true;
                }
            }
            for name in self.ctx.verifications.get_all().into_keys() {
                if self.verify_status.get(&name).is_none() {
                    self.finish_verify(&name);
                    changed = true;
                }
            }
            self.pump();
            changed |= self.ack();
            if !changed {
                return;
            }
        }
        panic!("collaborators never settled");
    }
}
