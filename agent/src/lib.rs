//! One-shot TCP transfer agent
//!
//! The agent is the disposable half of a taskcp transfer. It is shipped into the remote
//! container as part of the bootstrap command, started with its standard streams
//! redirected to or from the target file, and then speaks raw TCP to the local client
//! through the port tunnel:
//!
//! - it binds `0.0.0.0:<port>` and announces [`READY_MARKER`] on stderr (stdout may be
//!   the target file)
//! - it accepts exactly one connection
//! - stdin is copied to the connection (followed by a write half-close) while the
//!   connection is copied to stdout
//! - it finishes as soon as the peer closes the connection
//!
//! Both directions run concurrently, so the same binary serves uploads (`> file`, data
//! arrives on the connection) and downloads (`< file`, data leaves on the connection).

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;

/// Substring announced on stderr once the agent accepts connections
pub const READY_MARKER: &str = "listening on port";

/// Line printed by the agent once it is ready for the client
pub fn ready_line(port: u16) -> String {
    format!("{READY_MARKER} {port}")
}

/// Byte counts for a finished session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transferred {
    /// Bytes read from stdin and sent to the peer
    pub sent: u64,
    /// Bytes received from the peer and written to stdout
    pub received: u64,
}

pub async fn bind(port: u16) -> anyhow::Result<TcpListener> {
    TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to listen on port {port}"))
}

/// Bind `port`, announce readiness on `stderr` and serve a single connection
pub async fn run<I, O, E>(
    port: u16,
    stdin: I,
    stdout: O,
    mut stderr: E,
) -> anyhow::Result<Transferred>
where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let listener = bind(port).await?;
    let port = listener.local_addr()?.port();
    stderr
        .write_all(format!("{}\n", ready_line(port)).as_bytes())
        .await?;
    stderr.flush().await?;
    serve(listener, stdin, stdout).await
}

/// Accept one connection on `listener` and pump data until the peer closes it
pub async fn serve<I, O>(
    listener: TcpListener,
    stdin: I,
    stdout: O,
) -> anyhow::Result<Transferred>
where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let (conn, _peer) = listener
        .accept()
        .await
        .context("failed to accept connection")?;
    // one transfer per agent, stop listening right away
    drop(listener);
    let (mut read_half, mut write_half) = conn.into_split();
    let mut stdin = stdin;
    let mut stdout = stdout;
    let send = async {
        let n = tokio::io::copy(&mut stdin, &mut write_half).await?;
        write_half.shutdown().await?;
        Ok::<_, std::io::Error>(n)
    };
    let recv = async {
        let n = tokio::io::copy(&mut read_half, &mut stdout).await?;
        stdout.flush().await?;
        Ok::<_, std::io::Error>(n)
    };
    tokio::pin!(send);
    tokio::pin!(recv);
    let mut sent = None;
    let received = loop {
        tokio::select! {
            res = &mut send, if sent.is_none() => {
                sent = Some(res.context("failed to send stdin to peer")?);
            }
            res = &mut recv => {
                break res.context("failed to write received data to stdout")?;
            }
        }
    };
    Ok(Transferred {
        sent: sent.unwrap_or(0),
        received,
    })
}
