//! TCP client that talks to the remote agent through the local end of the tunnel
//!
//! The tunnel accepts connections before the agent is reachable behind it, so dialing is
//! retried with a fixed backoff until it succeeds or the caller cancels (typically
//! because the agent went down). Once connected there are no retries: the file is
//! streamed verbatim in one direction and any I/O error fails the transfer.

use std::path::Path;

use anyhow::Context;
use common::progress::{ProgressWriter, bytes_bar};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::BoxedWrite;

/// Per-attempt connection timeout
pub const DIAL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
/// Pause between failed connection attempts
pub const DIAL_BACKOFF: std::time::Duration = std::time::Duration::from_secs(1);
/// Buffer used when streaming file data
pub const BUFFER_SIZE: usize = 256 * 1024;
/// Destination name that selects stdout for downloads
pub const STDOUT_SENTINEL: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialPolicy {
    pub timeout: std::time::Duration,
    pub backoff: std::time::Duration,
}

impl Default for DialPolicy {
    fn default() -> Self {
        Self {
            timeout: DIAL_TIMEOUT,
            backoff: DIAL_BACKOFF,
        }
    }
}

/// A successful dial and the number of attempts that failed before it
#[derive(Debug)]
pub struct Dialed<S> {
    pub stream: S,
    pub failed_attempts: u32,
}

/// Call `dial` until it produces a stream
///
/// Each attempt is bounded by `policy.timeout`; failures are logged at debug level and
/// followed by `policy.backoff`. Returns `None` once `cancel` fires. There is no attempt
/// limit.
pub async fn dial_with_retry<S, F, Fut>(
    mut dial: F,
    policy: &DialPolicy,
    cancel: &CancellationToken,
) -> Option<Dialed<S>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::io::Result<S>>,
{
    let mut failed_attempts = 0u32;
    loop {
        let attempt = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            res = tokio::time::timeout(policy.timeout, dial()) => res,
        };
        match attempt {
            Ok(Ok(stream)) => {
                return Some(Dialed {
                    stream,
                    failed_attempts,
                });
            }
            Ok(Err(error)) => tracing::debug!("connection attempt failed, retrying: {}", error),
            Err(_) => tracing::debug!(
                "connection attempt timed out after {:?}, retrying",
                policy.timeout
            ),
        }
        failed_attempts += 1;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(policy.backoff) => {}
        }
    }
}

/// Client end of a single file transfer
#[derive(Debug)]
pub struct TransferClient<S = TcpStream> {
    conn: S,
    progress: bool,
}

impl TransferClient<TcpStream> {
    /// Dial `host:port` until connected; `None` if `cancel` fired first
    pub async fn connect(
        host: &str,
        port: u16,
        progress: bool,
        policy: &DialPolicy,
        cancel: &CancellationToken,
    ) -> Option<Self> {
        tracing::info!("connecting to {}:{}", host, port);
        let dialed = dial_with_retry(|| TcpStream::connect((host, port)), policy, cancel).await?;
        tracing::info!(
            "connected to {}:{} after {} failed attempt(s)",
            host,
            port,
            dialed.failed_attempts
        );
        Some(Self::new(dialed.stream, progress))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> TransferClient<S> {
    pub fn new(conn: S, progress: bool) -> Self {
        Self { conn, progress }
    }

    /// Stream a local file to the agent, returns the number of bytes sent
    ///
    /// The write side of the connection is shut down afterwards so the agent sees EOF.
    pub async fn send_file(&mut self, path: &Path) -> anyhow::Result<u64> {
        let size = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("failed to stat file {path:?}"))?
            .len();
        tracing::info!("sending file {:?} ({} bytes)", path, size);
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("failed to open file {path:?}"))?;
        // progress bars cannot render a zero-length total, show an indeterminate one
        let total = if size == 0 { None } else { Some(size) };
        let bar = bytes_bar("sending", total, self.progress);
        let mut writer = ProgressWriter::new(&mut self.conn, bar);
        let mut reader = tokio::io::BufReader::with_capacity(BUFFER_SIZE, file);
        let sent = tokio::io::copy_buf(&mut reader, &mut writer)
            .await
            .context("failed to send")?;
        writer
            .shutdown()
            .await
            .context("failed to close the sending side of the connection")?;
        writer.finish();
        tracing::info!("sent {:?} ({} bytes)", path, sent);
        Ok(sent)
    }

    /// Receive everything the agent sends until it closes the connection
    ///
    /// `dest` of [`STDOUT_SENTINEL`] writes to stdout instead of creating a file.
    pub async fn receive_file(&mut self, dest: &str) -> anyhow::Result<u64> {
        tracing::info!("receiving file into {:?}", dest);
        let out: BoxedWrite = if dest == STDOUT_SENTINEL {
            Box::new(tokio::io::stdout())
        } else {
            Box::new(
                tokio::fs::File::create(dest)
                    .await
                    .with_context(|| format!("failed to create file {dest:?}"))?,
            )
        };
        let mut writer = ProgressWriter::new(out, bytes_bar("receiving", None, self.progress));
        let mut reader = tokio::io::BufReader::with_capacity(BUFFER_SIZE, &mut self.conn);
        let received = tokio::io::copy_buf(&mut reader, &mut writer)
            .await
            .context("failed to receive")?;
        writer
            .flush()
            .await
            .with_context(|| format!("failed to flush {dest:?}"))?;
        writer.finish();
        tracing::info!("received {:?} ({} bytes)", dest, received);
        Ok(received)
    }
}
