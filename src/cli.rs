//! Clap option structs for the `ftpx` client and the `ftpxd` daemon

use crate::protocol::timeouts;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Daemon options used by ftpxd
#[derive(Clone, Debug, Parser)]
#[command(name = "ftpxd", version, about = "ftpx daemon - serves one upload directory over TCP")]
pub struct DaemonOpts {
    /// Bind address (host:port)
    #[arg(long, default_value = "0.0.0.0:1263")]
    pub bind: String,

    /// Upload directory to serve (created on first upload)
    #[arg(long, default_value = "./upload")]
    pub root: PathBuf,

    /// Seconds any single read or write may block before the connection is dropped
    #[arg(long, default_value_t = timeouts::IO_MS / 1000)]
    pub timeout_secs: u64,
}

/// Client options used by ftpx
#[derive(Clone, Debug, Parser)]
#[command(name = "ftpx", version, about = "ftpx client - upload, download, list and search files")]
pub struct ClientOpts {
    /// Server address (host:port)
    #[arg(long, default_value = "127.0.0.1:1263")]
    pub server: String,

    /// Local directory downloads are written under
    #[arg(long, default_value = "./download")]
    pub download_dir: PathBuf,

    /// Maximum concurrent transfers for upload/download batches
    #[arg(short, long, default_value_t = 4)]
    pub jobs: usize,

    /// Seconds any single read or write may block
    #[arg(long, default_value_t = timeouts::IO_MS / 1000)]
    pub timeout_secs: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Upload one or more local files
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Download one or more files by their path relative to the server's upload directory
    Download {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// List the server's upload directory
    #[command(alias = "list")]
    Show,
    /// Find where files with the given names live on the server
    Search {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_upload_many() {
        let opts = ClientOpts::try_parse_from(["ftpx", "upload", "a.bin", "b.bin"]).unwrap();
        assert_eq!(opts.server, "127.0.0.1:1263");
        assert_eq!(opts.jobs, 4);
        match opts.command {
            Command::Upload { paths } => {
                assert_eq!(paths, vec![PathBuf::from("a.bin"), PathBuf::from("b.bin")])
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_client_missing_args_rejected() {
        assert!(ClientOpts::try_parse_from(["ftpx"]).is_err());
        assert!(ClientOpts::try_parse_from(["ftpx", "upload"]).is_err());
        assert!(ClientOpts::try_parse_from(["ftpx", "download"]).is_err());
        assert!(ClientOpts::try_parse_from(["ftpx", "search"]).is_err());
        assert!(ClientOpts::try_parse_from(["ftpx", "frobnicate", "x"]).is_err());
    }

    #[test]
    fn test_client_show_and_alias() {
        let opts = ClientOpts::try_parse_from(["ftpx", "--server", "10.0.0.2:1263", "show"]).unwrap();
        assert!(matches!(opts.command, Command::Show));
        assert_eq!(opts.server, "10.0.0.2:1263");
        let opts = ClientOpts::try_parse_from(["ftpx", "list"]).unwrap();
        assert!(matches!(opts.command, Command::Show));
    }

    #[test]
    fn test_daemon_defaults() {
        let opts = DaemonOpts::try_parse_from(["ftpxd"]).unwrap();
        assert_eq!(opts.bind, "0.0.0.0:1263");
        assert_eq!(opts.root, PathBuf::from("./upload"));
        assert_eq!(opts.timeout_secs, 30);
    }
}
