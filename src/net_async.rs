//! Async (Tokio) transport for the ftpx daemon and client.
//!
//! Every connection carries exactly one command: the client sends a 1024-byte
//! header, then the operation-specific body or response follows and the
//! connection closes.

use crate::error::{FtpError, Result};
use crate::transfer::{
    read_to_end_limited, read_up_to_timed, shutdown_timed, write_all_timed, TransferSession,
};
use std::time::Instant;

pub mod server {
    use super::*;
    use crate::config::ServerConfig;
    use crate::fs_enum::{list_entries, resolve_all};
    use crate::protocol::{HEADER_LEN, MIN_HEADER_LEN};
    use crate::protocol_core::{
        encode_i64_be, ensure_dir_exists, normalize_under_root, parse_search_names,
        sanitize_file_name, CommandHeader, Operation,
    };
    use std::future::Future;
    use std::io::ErrorKind;
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::fs::File;
    use tokio::io::{AsyncRead, AsyncWrite};
    use tokio::net::TcpListener;
    use tracing::{debug, error, info, warn};

    /// Bound listener plus the configuration every connection task reads
    pub struct Server {
        listener: TcpListener,
        config: Arc<ServerConfig>,
    }

    impl Server {
        pub async fn bind(config: ServerConfig) -> Result<Self> {
            let listener = TcpListener::bind(&config.bind).await?;
            Ok(Self {
                listener,
                config: Arc::new(config),
            })
        }

        pub fn local_addr(&self) -> Result<SocketAddr> {
            Ok(self.listener.local_addr()?)
        }

        /// Accept connections until the listener fails
        pub async fn run(self) -> Result<()> {
            self.run_until(std::future::pending()).await
        }

        /// Accept connections until the listener fails or `shutdown` resolves.
        /// Connection tasks already running are left to finish on their own.
        pub async fn run_until<F>(self, shutdown: F) -> Result<()>
        where
            F: Future<Output = ()>,
        {
            tokio::pin!(shutdown);
            info!(
                "ftpx daemon listening on {} root={}",
                self.local_addr()?,
                self.config.root.display()
            );
            loop {
                tokio::select! {
                    _ = &mut shutdown => {
                        info!("shutdown requested, no longer accepting connections");
                        return Ok(());
                    }
                    accepted = self.listener.accept() => {
                        let (stream, peer) = accepted?;
                        let _ = stream.set_nodelay(true);
                        debug!(%peer, "connection accepted");
                        // Spawn per-connection task.
                        let config = Arc::clone(&self.config);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, &config).await {
                                error!(%peer, "connection failed: {}", e);
                            }
                        });
                    }
                }
            }
        }
    }

    /// Read the command header: 1024 bytes, or at least 280 followed by EOF.
    /// Missing trailing bytes are left zero. A peer holding a partial header
    /// open is dropped when the read times out.
    pub async fn read_header<S>(stream: &mut S, limit: Duration) -> Result<[u8; HEADER_LEN]>
    where
        S: AsyncRead + Unpin,
    {
        let mut buf = [0u8; HEADER_LEN];
        let n = read_up_to_timed(stream, &mut buf, limit).await?;
        if n < MIN_HEADER_LEN {
            return Err(FtpError::protocol(format!(
                "header too short: {} bytes (need at least {})",
                n, MIN_HEADER_LEN
            )));
        }
        Ok(buf)
    }

    /// Serve one command on an accepted connection
    pub async fn handle_connection<S>(
        mut stream: S,
        peer: SocketAddr,
        config: &ServerConfig,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let started = Instant::now();
        let raw = read_header(&mut stream, config.io_timeout).await?;
        let header = CommandHeader::decode(&raw)?;
        debug!(%peer, op = %header.operation, name = %header.name, size = header.size, "header received");

        match &header.operation {
            Operation::Upload => {
                let bytes = receive_upload(&mut stream, &header, config).await?;
                info!(%peer, name = %header.name, bytes, elapsed_ms = started.elapsed().as_millis() as u64, "upload complete");
            }
            Operation::Download => {
                let bytes = send_download(&mut stream, &header.name, config).await?;
                info!(%peer, path = %header.name, bytes, elapsed_ms = started.elapsed().as_millis() as u64, "download complete");
            }
            Operation::Show => {
                let count = send_listing(&mut stream, config).await?;
                info!(%peer, entries = count, "listing sent");
            }
            Operation::Search => {
                let names = parse_search_names(&raw);
                let found = send_search_results(&mut stream, &names, config).await?;
                info!(%peer, requested = names.len(), found, "search results sent");
            }
            Operation::Unknown(tag) => {
                warn!(%peer, "unknown operation {:?}, closing connection", tag);
            }
        }
        Ok(())
    }

    async fn receive_upload<S>(
        stream: &mut S,
        header: &CommandHeader,
        config: &ServerConfig,
    ) -> Result<u64>
    where
        S: AsyncRead + Unpin,
    {
        let name = sanitize_file_name(&header.name)?;
        let mut session = TransferSession::from_declared(&mut *stream, header.size, config.io_timeout)?;

        ensure_dir_exists(&config.root).await?;
        let path = config.root.join(&name);
        let mut file = File::create(&path).await?;
        debug!(path = %path.display(), size = session.total(), "receiving upload");
        session.receive_into(&mut file).await
    }

    async fn send_download<S>(stream: &mut S, rel: &str, config: &ServerConfig) -> Result<u64>
    where
        S: AsyncWrite + Unpin,
    {
        let path = normalize_under_root(&config.root, rel)?;
        let meta = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FtpError::NotFound(PathBuf::from(rel)))
            }
            Err(e) => return Err(e.into()),
        };
        if !meta.is_file() {
            return Err(FtpError::IsDirectory(PathBuf::from(rel)));
        }

        let mut file = File::open(&path).await?;
        let size = meta.len();
        let declared = i64::try_from(size)
            .map_err(|_| FtpError::protocol(format!("file too large to declare: {} bytes", size)))?;

        write_all_timed(stream, &encode_i64_be(declared), config.io_timeout).await?;
        let mut session = TransferSession::new(&mut *stream, size, config.io_timeout);
        session.send_from(&mut file).await
    }

    async fn send_listing<S>(stream: &mut S, config: &ServerConfig) -> Result<usize>
    where
        S: AsyncWrite + Unpin,
    {
        let root = config.root.clone();
        let names = tokio::task::spawn_blocking(move || list_entries(&root))
            .await
            .map_err(join_error)??;

        write_all_timed(stream, names.join("\n").as_bytes(), config.io_timeout).await?;
        shutdown_timed(stream, config.io_timeout).await?;
        Ok(names.len())
    }

    async fn send_search_results<S>(
        stream: &mut S,
        names: &[String],
        config: &ServerConfig,
    ) -> Result<usize>
    where
        S: AsyncWrite + Unpin,
    {
        let root = config.root.clone();
        let wanted = names.to_vec();
        let results = tokio::task::spawn_blocking(move || resolve_all(&root, &wanted))
            .await
            .map_err(join_error)?;

        let body = serde_json::to_vec(&results)?;
        write_all_timed(stream, &body, config.io_timeout).await?;
        shutdown_timed(stream, config.io_timeout).await?;
        Ok(results.iter().filter(|(_, path)| !path.is_empty()).count())
    }

    fn join_error(e: tokio::task::JoinError) -> FtpError {
        FtpError::Io(std::io::Error::new(
            ErrorKind::Other,
            format!("blocking task failed: {}", e),
        ))
    }
}

pub mod client {
    use super::*;
    use crate::config::ClientConfig;
    use crate::fs_enum::SearchResults;
    use crate::protocol::MAX_RESPONSE_LEN;
    use crate::protocol_core::{
        decode_field, decode_i64_be, ensure_parent_exists, normalize_under_root,
        pack_search_names, sanitize_file_name, CommandHeader, Operation,
    };
    use crate::transfer::read_timed;
    use std::future::Future;
    use std::io::ErrorKind;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tokio::fs::File;
    use tokio::net::TcpStream;
    use tokio::sync::Semaphore;
    use tokio::time::timeout;
    use tracing::{debug, error, info, warn};

    pub async fn connect(config: &ClientConfig) -> Result<TcpStream> {
        match timeout(config.connect_timeout, TcpStream::connect(&config.server)).await {
            Ok(Ok(stream)) => {
                let _ = stream.set_nodelay(true);
                Ok(stream)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(FtpError::Timeout {
                ms: config.connect_timeout.as_millis() as u64,
            }),
        }
    }

    async fn send_header(
        stream: &mut TcpStream,
        header: &[u8],
        config: &ClientConfig,
    ) -> Result<()> {
        write_all_timed(stream, header, config.io_timeout).await
    }

    /// Upload one local file under its base name
    pub async fn upload(config: &ClientConfig, path: &Path) -> Result<u64> {
        let meta = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FtpError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        if !meta.is_file() {
            return Err(FtpError::IsDirectory(path.to_path_buf()));
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| FtpError::protocol(format!("invalid file name: {}", path.display())))?;
        // The server rejects the same names without replying, which would
        // otherwise look like a completed upload
        let name = sanitize_file_name(name)?;
        let name = name.as_str();
        let size = meta.len();
        let declared = i64::try_from(size)
            .map_err(|_| FtpError::protocol(format!("file too large to declare: {} bytes", size)))?;
        let header = CommandHeader::new(Operation::Upload, name, declared)?;

        let mut file = File::open(path).await?;
        let mut stream = connect(config).await?;
        let started = Instant::now();
        send_header(&mut stream, &header.encode(), config).await?;

        let mut session = TransferSession::new(&mut stream, size, config.io_timeout);
        let sent = session.send_from(&mut file).await?;
        shutdown_timed(&mut stream, config.io_timeout).await?;

        // EOF only means the server stopped reading; it never acknowledges
        let mut probe = [0u8; 1];
        if read_timed(&mut stream, &mut probe, config.io_timeout).await? != 0 {
            return Err(FtpError::protocol("unexpected data after upload"));
        }

        info!(name, bytes = sent, elapsed_ms = started.elapsed().as_millis() as u64, "uploaded");
        Ok(sent)
    }

    /// Download one file by its path relative to the server's upload directory.
    ///
    /// The local file is created only after the server has announced a size,
    /// so a missing remote file leaves nothing behind.
    pub async fn download(config: &ClientConfig, remote_path: &str) -> Result<u64> {
        let header = CommandHeader::new(Operation::Download, remote_path, 0)?;
        let dest = normalize_under_root(&config.download_dir, remote_path)?;

        let mut stream = connect(config).await?;
        let started = Instant::now();
        send_header(&mut stream, &header.encode(), config).await?;

        let mut size_buf = [0u8; 8];
        let n = read_up_to_timed(&mut stream, &mut size_buf, config.io_timeout).await?;
        if n < size_buf.len() {
            return Err(FtpError::protocol(format!(
                "server did not send a file size for {} ({} of 8 bytes)",
                remote_path, n
            )));
        }
        let mut session =
            TransferSession::from_declared(&mut stream, decode_i64_be(size_buf), config.io_timeout)?;
        debug!(path = remote_path, size = session.total(), dest = %dest.display(), "download size received");

        ensure_parent_exists(&dest).await?;
        let mut file = File::create(&dest).await?;
        let received = session.receive_into(&mut file).await?;

        info!(path = remote_path, bytes = received, elapsed_ms = started.elapsed().as_millis() as u64, "downloaded");
        Ok(received)
    }

    /// Names of the entries in the server's upload directory
    pub async fn show(config: &ClientConfig) -> Result<Vec<String>> {
        let header = CommandHeader::new(Operation::Show, "", 0)?;
        let mut stream = connect(config).await?;
        send_header(&mut stream, &header.encode(), config).await?;

        let body = read_to_end_limited(&mut stream, MAX_RESPONSE_LEN, config.io_timeout).await?;
        let text = decode_field(&body, 0, body.len());
        Ok(text
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Resolve file names to their paths on the server
    pub async fn search<S: AsRef<str>>(config: &ClientConfig, names: &[S]) -> Result<SearchResults> {
        let (header, accepted) = pack_search_names(names);
        if accepted.len() < names.len() {
            warn!(
                dropped = names.len() - accepted.len(),
                "search names did not fit in the command header and were dropped"
            );
        }

        let mut stream = connect(config).await?;
        send_header(&mut stream, &header, config).await?;

        let body = read_to_end_limited(&mut stream, MAX_RESPONSE_LEN, config.io_timeout).await?;
        if body.is_empty() {
            return Err(FtpError::protocol("empty search response"));
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Outcome of a multi-file batch
    #[derive(Debug, Default)]
    pub struct BatchReport {
        pub succeeded: Vec<(String, u64)>,
        pub failed: Vec<(String, FtpError)>,
    }

    impl BatchReport {
        pub fn is_success(&self) -> bool {
            self.failed.is_empty()
        }

        pub fn bytes(&self) -> u64 {
            self.succeeded.iter().map(|(_, b)| b).sum()
        }
    }

    pub async fn upload_many(config: &ClientConfig, paths: &[PathBuf]) -> Result<BatchReport> {
        let items = paths.iter().map(|p| p.to_string_lossy().into_owned()).collect();
        run_batch(config, items, |cfg, item| async move {
            upload(&cfg, Path::new(&item)).await
        })
        .await
    }

    pub async fn download_many<S: AsRef<str>>(
        config: &ClientConfig,
        remote_paths: &[S],
    ) -> Result<BatchReport> {
        let items = remote_paths.iter().map(|p| p.as_ref().to_string()).collect();
        run_batch(config, items, |cfg, item| async move { download(&cfg, &item).await }).await
    }

    /// One task per item, at most `config.jobs` running at once; waits for all
    /// of them and records every failure.
    async fn run_batch<F, Fut>(config: &ClientConfig, items: Vec<String>, op: F) -> Result<BatchReport>
    where
        F: Fn(Arc<ClientConfig>, String) -> Fut,
        Fut: Future<Output = Result<u64>> + Send + 'static,
    {
        config.validate()?;
        let config = Arc::new(config.clone());
        let permits = Arc::new(Semaphore::new(config.jobs));

        let mut handles = Vec::with_capacity(items.len());
        for item in items {
            let permits = Arc::clone(&permits);
            let task = op(Arc::clone(&config), item.clone());
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.map_err(|e| {
                    FtpError::Io(std::io::Error::new(ErrorKind::Other, e.to_string()))
                })?;
                task.await
            });
            handles.push((item, handle));
        }

        // Wait for all transfers to complete
        let mut report = BatchReport::default();
        for (item, handle) in handles {
            match handle.await {
                Ok(Ok(bytes)) => report.succeeded.push((item, bytes)),
                Ok(Err(e)) => {
                    error!("Error transferring {}: {}", item, e);
                    report.failed.push((item, e));
                }
                Err(e) => {
                    error!("Task join error for {}: {}", item, e);
                    let err = FtpError::Io(std::io::Error::new(
                        ErrorKind::Other,
                        format!("task join error: {}", e),
                    ));
                    report.failed.push((item, err));
                }
            }
        }
        Ok(report)
    }
}
