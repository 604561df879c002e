//! Chunked file body transfer over an open connection
//!
//! A `TransferSession` moves exactly `total` bytes between a stream and a
//! file in either direction. Every blocking stream operation runs under the
//! session's I/O timeout.

use crate::error::{FtpError, Result};
use crate::protocol::CHUNK_SIZE;
use std::io::SeekFrom;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

fn timeout_err(limit: Duration) -> FtpError {
    FtpError::Timeout {
        ms: limit.as_millis() as u64,
    }
}

#[inline]
pub(crate) async fn read_timed<S>(stream: &mut S, buf: &mut [u8], limit: Duration) -> Result<usize>
where
    S: AsyncRead + Unpin,
{
    match timeout(limit, stream.read(buf)).await {
        Ok(Ok(n)) => Ok(n),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(timeout_err(limit)),
    }
}

#[inline]
pub(crate) async fn write_all_timed<S>(stream: &mut S, buf: &[u8], limit: Duration) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    match timeout(limit, stream.write_all(buf)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(timeout_err(limit)),
    }
}

pub(crate) async fn flush_timed<S>(stream: &mut S, limit: Duration) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    match timeout(limit, stream.flush()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(timeout_err(limit)),
    }
}

pub(crate) async fn shutdown_timed<S>(stream: &mut S, limit: Duration) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    match timeout(limit, stream.shutdown()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(timeout_err(limit)),
    }
}

/// Fill `buf` until it is full or the peer closes; returns bytes read
pub(crate) async fn read_up_to_timed<S>(
    stream: &mut S,
    buf: &mut [u8],
    limit: Duration,
) -> Result<usize>
where
    S: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = read_timed(stream, &mut buf[filled..], limit).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Read until EOF, failing once more than `max` bytes arrive
pub(crate) async fn read_to_end_limited<S>(
    stream: &mut S,
    max: usize,
    limit: Duration,
) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut out = Vec::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = read_timed(stream, &mut buf, limit).await?;
        if n == 0 {
            return Ok(out);
        }
        if out.len() + n > max {
            return Err(FtpError::protocol(format!(
                "response too large: more than {} bytes",
                max
            )));
        }
        out.extend_from_slice(&buf[..n]);
    }
}

/// Number of chunk writes needed for `total` bytes
pub fn chunk_count(total: u64) -> u64 {
    total.div_ceil(CHUNK_SIZE as u64)
}

/// Live state of one file moving over one connection
pub struct TransferSession<S> {
    stream: S,
    total: u64,
    offset: u64,
    io_timeout: Duration,
}

impl<S> TransferSession<S> {
    pub fn new(stream: S, total: u64, io_timeout: Duration) -> Self {
        Self {
            stream,
            total,
            offset: 0,
            io_timeout,
        }
    }

    /// Session for a size as declared on the wire (signed)
    pub fn from_declared(stream: S, declared: i64, io_timeout: Duration) -> Result<Self> {
        let total = u64::try_from(declared)
            .map_err(|_| FtpError::protocol(format!("negative declared size: {}", declared)))?;
        Ok(Self::new(stream, total, io_timeout))
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: AsyncWrite + Unpin> TransferSession<S> {
    /// Stream `total` bytes of `file` in 1024-byte chunks.
    ///
    /// Each chunk is read at its absolute offset and written with a single
    /// `write_all`, so the peer sees exactly `ceil(total / 1024)` writes.
    pub async fn send_from<F>(&mut self, file: &mut F) -> Result<u64>
    where
        F: AsyncRead + AsyncSeek + Unpin,
    {
        let chunks = chunk_count(self.total);
        debug!(total = self.total, chunks, "sending file body");

        let mut buf = [0u8; CHUNK_SIZE];
        for i in 0..chunks {
            let start = i * CHUNK_SIZE as u64;
            let len = (self.total - start).min(CHUNK_SIZE as u64) as usize;
            file.seek(SeekFrom::Start(start)).await?;
            file.read_exact(&mut buf[..len]).await?;
            write_all_timed(&mut self.stream, &buf[..len], self.io_timeout).await?;
            self.offset = start + len as u64;
        }
        flush_timed(&mut self.stream, self.io_timeout).await?;
        Ok(self.offset)
    }
}

impl<S: AsyncRead + Unpin> TransferSession<S> {
    /// Receive exactly `total` bytes into `file`, seeking to the running offset
    /// before every write. A zero-byte transfer returns without reading.
    pub async fn receive_into<F>(&mut self, file: &mut F) -> Result<u64>
    where
        F: AsyncWrite + AsyncSeek + Unpin,
    {
        if self.total == 0 {
            return Ok(0);
        }
        debug!(total = self.total, "receiving file body");

        let mut buf = vec![0u8; self.total.min(CHUNK_SIZE as u64) as usize];
        while self.offset < self.total {
            // Never read past the declared size
            let want = (self.total - self.offset).min(buf.len() as u64) as usize;
            let n = read_timed(&mut self.stream, &mut buf[..want], self.io_timeout).await?;
            if n == 0 {
                return Err(FtpError::protocol(format!(
                    "stream closed early: received {}/{} bytes",
                    self.offset, self.total
                )));
            }
            file.seek(SeekFrom::Start(self.offset)).await?;
            file.write_all(&buf[..n]).await?;
            self.offset += n as u64;
        }
        file.flush().await?;
        Ok(self.offset)
    }
}
