// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use ef_bus::{Bus, Publication};
use ef_core::test_support::{file_datastore, storage};
use ef_core::{
    safename, AgentName, BaseOsConfig, BaseOsStatus, CertObjConfig, CertObjStatus, DatastoreConfig,
    DownloaderConfig, DownloaderStatus, FakeClock, ObjType, Paths, SwState, UuidAndVersion,
    VerifyImageStatus,
};
use tempfile::TempDir;
use uuid::Uuid;

use super::{BaseOsContext, Subs};

pub(super) const SHA_1: &str = "1111111111111111111111111111111111111111111111111111111111111111";
pub(super) const SHA_2: &str = "2222222222222222222222222222222222222222222222222222222222222222";
pub(super) const CERT_URL: &str = "file:///certs/root.pem";

pub(super) fn os_uuid() -> Uuid {
    Uuid::from_u128(0xb0)
}

pub(super) fn datastore_uuid() -> Uuid {
    Uuid::from_u128(0xd5)
}

pub(super) fn os_url(version: &str) -> String {
    format!("file:///img/os-{}.img", version)
}

pub(super) fn os_safename(version: &str, sha: &str) -> String {
    safename(&os_url(version), sha)
}

pub(super) fn base_os(uuid: Uuid, version: &str, sha: &str, activate: bool) -> BaseOsConfig {
    BaseOsConfig {
        uuid_and_version: UuidAndVersion::new(uuid, "1"),
        base_os_version: version.to_string(),
        storage_config_list: vec![storage(datastore_uuid(), &os_url(version), sha, 64)],
        activate,
        test_complete: false,
    }
}

pub(super) fn cert(version: &str) -> CertObjConfig {
    CertObjConfig {
        uuid_and_version: UuidAndVersion::new(Uuid::from_u128(0xce), version),
        storage_config_list: vec![storage(datastore_uuid(), CERT_URL, "", 0)],
    }
}

/// The base-OS manager over a temp state dir, plus publications standing in
/// for intake, the downloader and the verifier.
pub(super) struct Fixture {
    pub dir: TempDir,
    pub subs: Subs<FakeClock>,
    pub ctx: BaseOsContext<FakeClock>,
    pub configs: Publication<BaseOsConfig>,
    pub certs: Publication<CertObjConfig>,
    pub datastores: Publication<DatastoreConfig>,
    pub download_status: Publication<DownloaderStatus>,
    pub cert_download_status: Publication<DownloaderStatus>,
    pub verify_status: Publication<VerifyImageStatus>,
}

pub(super) fn fixture() -> Fixture {
    let mut f = fixture_on(Bus::in_memory());
    f.datastores.publish(&datastore_uuid().to_string(), &file_datastore(datastore_uuid())).unwrap();
    f.pump();
    f
}

/// Fixture over `bus` without any datastore.
pub(super) fn fixture_on(bus: Bus) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut subs = Subs::new(&bus).unwrap();
    let ctx = BaseOsContext::new(&bus, Paths::new(dir.path()), FakeClock::new(), &subs).unwrap();
    subs.verifications.activate();
    subs.activate_rest();
    Fixture {
        dir,
        subs,
        ctx,
        configs: bus.publication(AgentName::Zedagent, None).unwrap(),
        certs: bus.publication(AgentName::Zedagent, None).unwrap(),
        datastores: bus.publication(AgentName::Zedagent, None).unwrap(),
        download_status: bus.publication(AgentName::Downloader, Some(ObjType::BaseOs)).unwrap(),
        cert_download_status: bus.publication(AgentName::Downloader, Some(ObjType::Cert)).unwrap(),
        verify_status: bus.publication(AgentName::Verifier, Some(ObjType::BaseOs)).unwrap(),
    }
}

fn downloaded(config: &DownloaderConfig) -> DownloaderStatus {
    let mut status = DownloaderStatus::from_config(config, 0);
    status.state = SwState::Downloaded;
    status.size = config.size;
    status.progress = 100;
    status
}

impl Fixture {
    pub fn paths(&self) -> Paths {
        Paths::new(self.dir.path())
    }

    pub fn pump(&mut self) {
        loop {
            let s = &mut self.subs;
            let c = &mut self.ctx;
            let n = s.configs.drain(c).unwrap()
                + s.certs.drain(c).unwrap()
                + s.datastores.drain(c).unwrap()
                + s.downloads.drain(c).unwrap()
                + s.cert_downloads.drain(c).unwrap()
                + s.verifications.drain(c).unwrap();
            if n == 0 {
                return;
            }
        }
    }

    pub fn apply(&mut self, config: &BaseOsConfig) {
        self.configs.publish(&config.uuid_and_version.key(), config).unwrap();
        self.pump();
    }

    pub fn apply_cert(&mut self, config: &CertObjConfig) {
        self.certs.publish(&config.uuid_and_version.key(), config).unwrap();
        self.pump();
    }

    pub fn status(&self, uuid: Uuid) -> BaseOsStatus {
        self.ctx.statuses.get(&uuid.to_string()).unwrap()
    }

    pub fn cert_status(&self) -> CertObjStatus {
        self.ctx.cert_statuses.get(&cert("1").uuid_and_version.key()).unwrap()
    }

    /// Verified image content for `safename`, as the verifier leaves it.
    pub fn finish_verify(&self, name: &str) {
        let config = self.ctx.verifications.get(name).unwrap();
        let path = self.dir.path().join("verified").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, format!("image {}", name)).unwrap();
        let status = VerifyImageStatus {
            safename: name.to_string(),
            obj_type: ObjType::BaseOs,
            image_sha256: config.image_sha256,
            ref_count: config.ref_count,
            state: SwState::Delivered,
            pending_add: false,
            size: 64,
            verified_path: path.display().to_string(),
            last_use_ms: 0,
            expired: false,
            last_err: String::new(),
            last_err_time_ms: 0,
        };
        self.verify_status.publish(name, &status).unwrap();
    }

    pub fn finish_cert_download(&self, config: &DownloaderConfig) {
        let pending =
            self.paths().pending_file(ObjType::Cert, &config.image_sha256, &config.safename);
        std::fs::create_dir_all(pending.parent().unwrap()).unwrap();
        std::fs::write(&pending, b"-----BEGIN CERTIFICATE-----").unwrap();
        self.cert_download_status.publish(&config.safename, &downloaded(config)).unwrap();
    }

    /// Play the downloader and verifier until nothing moves.
    pub fn settle(&mut self) {
        for _ in 0..20 {
            let mut changed = false;
            for (name, config) in self.ctx.downloads.get_all() {
                if self.download_status.get(&name).is_none() {
                    self.download_status.publish(&name, &downloaded(&config)).unwrap();
                    changed = true;
                }
            }
            for (name, config) in self.ctx.cert_downloads.get_all() {
                if self.cert_download_status.get(&name).is_none() {
                    self.finish_cert_download(&config);
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
            if !changed {
                return;
            }
        }
        panic!("downloader and verifier never settled");
    }
}
