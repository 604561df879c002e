//! Error types for ftpx
//!
//! One error enum shared by the codec, the transfer loop, the server
//! dispatcher and the client drivers.

use std::path::PathBuf;

/// Main error type for ftpx operations
#[derive(Debug, thiserror::Error)]
pub enum FtpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Not a regular file: {}", .0.display())]
    IsDirectory(PathBuf),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timed out after {ms} ms")]
    Timeout { ms: u64 },

    #[error("Malformed JSON response: {0}")]
    Json(#[from] serde_json::Error),
}

impl FtpError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for errors caused by the peer misbehaving rather than local I/O
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

pub type Result<T> = std::result::Result<T, FtpError>;
