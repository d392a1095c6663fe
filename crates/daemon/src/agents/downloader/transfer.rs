// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transfer backends, selected by the datastore transport scheme.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

const CHUNK: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("unsupported transport {0:?}")]
    Unsupported(String),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("size {actual} exceeds limit {limit}")]
    TooLarge { actual: u64, limit: u64 },

    #[error("{0}")]
    Remote(String),
}

/// One attempt to fetch an artifact into `dest` from a given source address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub scheme: String,
    pub url: String,
    pub dpath: String,
    pub api_key: String,
    pub password: String,
    /// Zero means unlimited
    pub size_limit: u64,
    pub source: IpAddr,
    pub dest: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_so_far: u64,
    pub total_bytes: u64,
}

impl TransferProgress {
    pub fn percent(&self) -> u32 {
        if self.total_bytes == 0 {
            return 0;
        }
        ((self.bytes_so_far.min(self.total_bytes) * 100) / self.total_bytes) as u32
    }
}

/// Moves bytes; knows nothing about quota, status records or retries.
#[async_trait]
pub trait TransferBackend: Send + Sync + 'static {
    async fn fetch(
        &self,
        req: &TransferRequest,
        progress: mpsc::UnboundedSender<TransferProgress>,
    ) -> Result<(), TransferError>;
}

/// Scheme taken from the config's transport, else from the URL prefix.
pub fn scheme_of(transport: &str, url: &str) -> String {
    if !transport.is_empty() {
        return transport.to_ascii_lowercase();
    }
    match url.split_once("://") {
        Some((scheme, _)) => scheme.to_ascii_lowercase(),
        None => "file".to_string(),
    }
}

/// Copies from the local filesystem. `file://` URLs and bare paths are accepted;
/// a non-empty `dpath` is used as the base directory for relative paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTransfer;

impl FileTransfer {
    fn source_path(req: &TransferRequest) -> PathBuf {
        let raw = req.url.strip_prefix("file://").unwrap_or(&req.url);
        let path = Path::new(raw);
        if path.is_relative() && !req.dpath.is_empty() {
            Path::new(&req.dpath).join(path)
        } else {
            path.to_path_buf()
        }
    }
}

#[async_trait]
impl TransferBackend for FileTransfer {
    async fn fetch(
        &self,
        req: &TransferRequest,
        progress: mpsc::UnboundedSender<TransferProgress>,
    ) -> Result<(), TransferError> {
        let src = Self::source_path(req);
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| TransferError::Io { path, source }
        };

        let total = tokio::fs::metadata(&src).await.map_err(io_err(&src))?.len();
        if req.size_limit > 0 && total > req.size_limit {
            return Err(TransferError::TooLarge { actual: total, limit: req.size_limit });
        }
        if let Some(dir) = req.dest.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(io_err(dir))?;
        }

        let mut reader = tokio::fs::File::open(&src).await.map_err(io_err(&src))?;
        let mut writer = tokio::fs::File::create(&req.dest).await.map_err(io_err(&req.dest))?;
        let mut buf = vec![0u8; CHUNK];
        let mut so_far = 0u64;
        loop {
            let n = reader.read(&mut buf).await.map_err(io_err(&src))?;
            if n == 0 {
                break;
            }
            so_far += n as u64;
            if req.size_limit > 0 && so_far > req.size_limit {
                return Err(TransferError::TooLarge { actual: so_far, limit: req.size_limit });
            }
            writer.write_all(&buf[..n]).await.map_err(io_err(&req.dest))?;
            let _ = progress.send(TransferProgress { bytes_so_far: so_far, total_bytes: total });
        }
        writer.flush().await.map_err(io_err(&req.dest))?;
        Ok(())
    }
}

/// Dispatches to a backend by scheme.
#[derive(Clone, Default)]
pub struct TransferRouter {
    backends: HashMap<String, Arc<dyn TransferBackend>>,
}

impl TransferRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router with the built-in `file` backend.
    pub fn local() -> Self {
        Self::new().with("file", FileTransfer)
    }

    pub fn with(mut self, scheme: &str, backend: impl TransferBackend) -> Self {
        self.backends.insert(scheme.to_ascii_lowercase(), Arc::new(backend));
        self
    }
}

#[async_trait]
impl TransferBackend for TransferRouter {
    async fn fetch(
        &self,
        req: &TransferRequest,
        progress: mpsc::UnboundedSender<TransferProgress>,
    ) -> Result<(), TransferError> {
        match self.backends.get(&req.scheme) {
            Some(backend) => backend.fetch(req, progress).await,
            None => Err(TransferError::Unsupported(req.scheme.clone())),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{TransferBackend, TransferError, TransferProgress, TransferRequest};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// How the fake answers for one URL.
    #[derive(Debug, Clone)]
    pub enum FakeOutcome {
        /// Write this many bytes
        Bytes(u64),
        Fail(String),
    }

    #[derive(Default)]
    struct FakeTransferState {
        calls: Vec<TransferRequest>,
        outcomes: HashMap<String, FakeOutcome>,
        in_flight: HashMap<String, usize>,
        max_in_flight: HashMap<String, usize>,
        delay: Duration,
    }

    /// Fake transfer backend for testing.
    ///
    /// Unknown URLs succeed with `size_limit` bytes (or 1 KiB when unlimited).
    #[derive(Clone, Default)]
    pub struct FakeTransfer {
        inner: Arc<Mutex<FakeTransferState>>,
    }

    impl FakeTransfer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_outcome(&self, url: &str, outcome: FakeOutcome) {
            self.inner.lock().outcomes.insert(url.to_string(), outcome);
        }

        /// Hold every fetch open for `delay` before finishing
        pub fn set_delay(&self, delay: Duration) {
            self.inner.lock().delay = delay;
        }

        pub fn calls(&self) -> Vec<TransferRequest> {
            self.inner.lock().calls.clone()
        }

        pub fn calls_for(&self, url: &str) -> usize {
            self.inner.lock().calls.iter().filter(|c| c.url == url).count()
        }

        /// Highest number of overlapping fetches seen for one destination
        pub fn max_concurrent(&self, dest_suffix: &str) -> usize {
            let inner = self.inner.lock();
            inner
                .max_in_flight
                .iter()
                .filter(|(k, _)| k.ends_with(dest_suffix))
                .map(|(_, v)| *v)
                .max()
                .unwrap_or(0)
        }
    }

    #[async_trait]
    impl TransferBackend for FakeTransfer {
        async fn fetch(
            &self,
            req: &TransferRequest,
            progress: mpsc::UnboundedSender<TransferProgress>,
        ) -> Result<(), TransferError> {
            let key = req.dest.display().to_string();
            let (outcome, delay) = {
                let mut inner = self.inner.lock();
                inner.calls.push(req.clone());
                let now = {
                    let count = inner.in_flight.entry(key.clone()).or_insert(0);
                    *count += 1;
                    *count
                };
                let max = inner.max_in_flight.entry(key.clone()).or_insert(0);
                *max = (*max).max(now);
                let default =
                    FakeOutcome::Bytes(if req.size_limit > 0 { req.size_limit } else { 1024 });
                (inner.outcomes.get(&req.url).cloned().unwrap_or(default), inner.delay)
            };

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let result = match outcome {
                FakeOutcome::Bytes(n) => {
                    let write = async {
                        if let Some(dir) = req.dest.parent() {
                            tokio::fs::create_dir_all(dir).await?;
                        }
                        tokio::fs::write(&req.dest, vec![0u8; n as usize]).await
                    };
                    match write.await {
                        Ok(()) => {
                            let _ =
                                progress.send(TransferProgress { bytes_so_far: n, total_bytes: n });
                            Ok(())
                        }
                        Err(source) => Err(TransferError::Io { path: req.dest.clone(), source }),
                    }
                }
                FakeOutcome::Fail(msg) => Err(TransferError::Remote(msg)),
            };

            if let Some(count) = self.inner.lock().in_flight.get_mut(&key) {
                *count -= 1;
            }
            result
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeOutcome, FakeTransfer};

#[cfg(test)]
#[path = "transfer_tests.rs"]
mod tests;
