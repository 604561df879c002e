//! Runtime configuration, built once at startup and passed to the server and
//! the client drivers.

use crate::cli::{ClientOpts, DaemonOpts};
use crate::error::{FtpError, Result};
use crate::protocol::{timeouts, DEFAULT_PORT};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_UPLOAD_DIR: &str = "./upload";
const DEFAULT_DOWNLOAD_DIR: &str = "./download";
const DEFAULT_JOBS: usize = 4;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (host:port)
    pub bind: String,
    /// Upload directory: the whole store
    pub root: PathBuf,
    /// Deadline for any single connection read or write
    pub io_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: format!("0.0.0.0:{}", DEFAULT_PORT),
            root: PathBuf::from(DEFAULT_UPLOAD_DIR),
            io_timeout: Duration::from_millis(timeouts::IO_MS),
        }
    }
}

impl ServerConfig {
    pub fn new(bind: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            bind: bind.into(),
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }
}

impl TryFrom<&DaemonOpts> for ServerConfig {
    type Error = FtpError;

    fn try_from(opts: &DaemonOpts) -> Result<Self> {
        Ok(Self {
            bind: opts.bind.clone(),
            root: opts.root.clone(),
            io_timeout: secs_to_timeout(opts.timeout_secs)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address (host:port)
    pub server: String,
    /// Downloads land under this directory, mirroring the remote relative path
    pub download_dir: PathBuf,
    pub io_timeout: Duration,
    pub connect_timeout: Duration,
    /// Maximum concurrent connections in a batch
    pub jobs: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: format!("127.0.0.1:{}", DEFAULT_PORT),
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            io_timeout: Duration::from_millis(timeouts::IO_MS),
            connect_timeout: Duration::from_millis(timeouts::CONNECT_MS),
            jobs: DEFAULT_JOBS,
        }
    }
}

impl ClientConfig {
    pub fn new(server: impl Into<String>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            server: server.into(),
            download_dir: download_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            return Err(FtpError::config("jobs must be at least 1"));
        }
        if self.server.trim().is_empty() {
            return Err(FtpError::config("server address is empty"));
        }
        Ok(())
    }
}

impl TryFrom<&ClientOpts> for ClientConfig {
    type Error = FtpError;

    fn try_from(opts: &ClientOpts) -> Result<Self> {
        let config = Self {
            server: opts.server.clone(),
            download_dir: opts.download_dir.clone(),
            io_timeout: secs_to_timeout(opts.timeout_secs)?,
            jobs: opts.jobs,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }
}

fn secs_to_timeout(secs: u64) -> Result<Duration> {
    if secs == 0 {
        return Err(FtpError::config("timeout must be at least 1 second"));
    }
    Ok(Duration::from_secs(secs))
}
