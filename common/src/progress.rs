//! Byte-level progress reporting for streaming transfers
//!
//! Progress is purely observational: [`ProgressWriter`] forwards every byte to the
//! wrapped writer unchanged and only counts what the inner writer accepted.

use std::pin::Pin;
use std::task::{Context, Poll};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWrite;

const BAR_TEMPLATE: &str =
    "{msg} [{elapsed_precise}] [{wide_bar}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";
const SPINNER_TEMPLATE: &str = "{spinner} {msg} [{elapsed_precise}] {bytes} ({bytes_per_sec})";
const TICK_INTERVAL: std::time::Duration = std::time::Duration::from_millis(200);

/// Create a byte progress bar
///
/// When `enabled` is false the returned bar is hidden and never draws. A `total` of
/// `None` produces an indeterminate spinner, which is also what callers should pass for
/// zero-length inputs since a zero-length bar does not render meaningfully.
pub fn bytes_bar(label: &str, total: Option<u64>, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = match total {
        Some(len) => {
            let bar = ProgressBar::new(len);
            bar.set_style(
                ProgressStyle::with_template(BAR_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            );
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template(SPINNER_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(TICK_INTERVAL);
            bar
        }
    };
    bar.set_message(label.to_string());
    bar
}

/// Pass-through writer that reports accepted bytes to a progress bar
pub struct ProgressWriter<W> {
    inner: W,
    bar: ProgressBar,
    written: u64,
}

impl<W> ProgressWriter<W> {
    pub fn new(inner: W, bar: ProgressBar) -> Self {
        Self {
            inner,
            bar,
            written: 0,
        }
    }

    /// Total number of bytes accepted by the inner writer so far
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Clear the bar from the terminal and return the inner writer
    pub fn finish(self) -> W {
        self.bar.finish_and_clear();
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for ProgressWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        let res = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &res {
            this.written += *n as u64;
            this.bar.inc(*n as u64);
        }
        res
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn writer_passes_bytes_through_unchanged() -> Result<()> {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut writer = ProgressWriter::new(Vec::new(), bytes_bar("test", None, false));
        for chunk in data.chunks(333) {
            writer.write_all(chunk).await?;
        }
        writer.flush().await?;
        assert_eq!(writer.bytes_written(), data.len() as u64);
        let out = writer.finish();
        assert_eq!(out, data);
        Ok(())
    }

    #[tokio::test]
    async fn counter_tracks_bar_position() -> Result<()> {
        let bar = ProgressBar::hidden();
        let mut writer = ProgressWriter::new(Vec::new(), bar.clone());
        writer.write_all(b"hello").await?;
        writer.write_all(b" world").await?;
        assert_eq!(writer.bytes_written(), 11);
        assert_eq!(bar.position(), 11);
        Ok(())
    }

    #[test]
    fn disabled_bar_is_hidden() {
        assert!(bytes_bar("sending", Some(10), false).is_hidden());
        assert!(bytes_bar("receiving", None, false).is_hidden());
    }
}
