//! Transports: where a flushed batch of trace records goes
//!
//! The set of destinations is closed, so it is an enum rather than a trait
//! object:
//!
//! - [`Transport::File`]: unbuffered append to `<dir>/<prefix><pid>.tsv`
//! - [`Transport::Http`]: one `POST` per batch (see [`crate::http_transport`])
//! - [`Transport::Capture`]: in-process batches, for embedders and tests
//! - [`Transport::Null`]: discards everything (tracing disabled or no sink)
//!
//! Transports report failures as [`TransportError`]; the serializer decides
//! what to do with them (log and drop).

use crate::config::TraceConfig;
use crate::endpoint::Endpoint;
use crate::http_transport::HttpTransport;
use std::fs::File;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors raised while delivering a batch
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open trace file {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("Failed to write trace file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("Failed to resolve host {host}: {source}")]
    Resolve { host: String, source: io::Error },

    #[error("No address found for host {0}")]
    NoAddress(String),

    #[error("Failed to connect to {addr}: {source}")]
    Connect { addr: SocketAddr, source: io::Error },

    #[error("Failed to configure socket: {0}")]
    Socket(io::Error),

    #[error("Failed to send request: {0}")]
    Send(io::Error),
}

/// Unbuffered trace file
///
/// `std::fs::File` performs one `write` per call, so each flush reaches the
/// kernel immediately.
#[derive(Debug)]
pub struct FileTransport {
    path: PathBuf,
    file: File,
}

impl FileTransport {
    /// Create (truncate) the file, creating its directory if needed
    pub fn create(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| TransportError::Open {
                path: path.clone(),
                source,
            })?;
        }
        let file = File::create(&path).map_err(|source| TransportError::Open {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.file
            .write_all(payload)
            .map_err(|source| TransportError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

/// Shared handle collecting every delivered batch in memory
///
/// Clones share the same storage, so a host can keep one handle and give
/// another to the tracer.
#[derive(Debug, Clone, Default)]
pub struct CaptureSink {
    batches: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        self.batches.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, payload: &[u8]) {
        self.lock().push(payload.to_vec());
    }

    /// Every batch in delivery order; one entry per flush
    pub fn batches(&self) -> Vec<Vec<u8>> {
        self.lock().clone()
    }

    /// All delivered bytes as text
    pub fn contents(&self) -> String {
        let batches = self.lock();
        let mut text = String::new();
        for batch in batches.iter() {
            text.push_str(&String::from_utf8_lossy(batch));
        }
        text
    }

    /// All delivered records, one per line
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

/// Destination of flushed trace batches
#[derive(Debug)]
pub enum Transport {
    File(FileTransport),
    Http(HttpTransport),
    Capture(CaptureSink),
    Null,
}

impl Transport {
    /// Pick a transport from configuration
    ///
    /// An endpoint selects HTTP, otherwise a file named after `prefix` is
    /// created. An unusable endpoint falls back to the file; a file that
    /// cannot be created yields [`Transport::Null`] so tracing degrades to a
    /// no-op instead of failing the host.
    pub fn from_config(config: &TraceConfig, prefix: &str) -> Self {
        if let Some(url) = config.entrypoint.as_deref() {
            match Endpoint::parse(url) {
                Ok(endpoint) => {
                    tracing::debug!(%endpoint, prefix, "using network transport");
                    return Transport::Http(HttpTransport::new(endpoint, config.timeout));
                }
                Err(e) => {
                    tracing::warn!("{}; falling back to file transport", e);
                }
            }
        }

        let path = config.output_path(prefix);
        match FileTransport::create(&path) {
            Ok(file) => {
                tracing::debug!(path = %path.display(), "using file transport");
                Transport::File(file)
            }
            Err(e) => {
                eprintln!("[cgtrace: {}]", e);
                eprintln!("[cgtrace: Continuing without {} output]", prefix);
                Transport::Null
            }
        }
    }

    /// Send one batch
    pub fn deliver(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        match self {
            Transport::File(file) => file.write(payload),
            Transport::Http(http) => http.post(payload),
            Transport::Capture(sink) => {
                sink.push(payload);
                Ok(())
            }
            Transport::Null => Ok(()),
        }
    }

    /// Release the destination; later deliveries are discarded
    pub fn close(&mut self) {
        if let Transport::File(file) = self {
            if let Err(e) = file.file.sync_all() {
                tracing::debug!(path = %file.path.display(), "sync on close failed: {}", e);
            }
        }
        *self = Transport::Null;
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Transport::File(_) => "file",
            Transport::Http(_) => "http",
            Transport::Capture(_) => "capture",
            Transport::Null => "null",
        }
    }
}
