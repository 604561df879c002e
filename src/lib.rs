//! ftpx library
//!
//! Minimal file transfer over TCP: a fixed 1024-byte command header followed
//! by a size-declared body, serving upload, download, list and search against
//! one server-side directory.

pub mod cli;
pub mod config;
pub mod error;
pub mod fs_enum;
pub mod logging;
pub mod net_async;
pub mod protocol;
pub mod protocol_core;
pub mod transfer;

pub use config::{ClientConfig, ServerConfig};
pub use error::{FtpError, Result};
pub use fs_enum::SearchResults;
pub use net_async::client::BatchReport;
pub use net_async::server::Server;
pub use transfer::TransferSession;
