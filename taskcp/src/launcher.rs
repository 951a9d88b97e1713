//! Remote agent launcher
//!
//! Runs the bootstrap command through the interactive command channel and scans its
//! combined output line by line. Every line is logged at debug level under the `agent`
//! target; the first line carrying the readiness marker raises the readiness signal. When
//! the channel returns the session is marked down.

use std::sync::Arc;

use remote::Target;
use remote::exec::{InteractiveExec, SignalPolicy};
use tokio::io::{AsyncBufReadExt, AsyncRead};
use tokio_util::sync::CancellationToken;

use crate::session::{ReadinessWatch, SessionState};

/// Buffer between the command channel and the output scanner
pub const OUTPUT_PIPE_CAPACITY: usize = 64 * 1024;

async fn scan_output(reader: impl AsyncRead + Unpin, mut readiness: ReadinessWatch) {
    let mut reader = tokio::io::BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                let text = text.trim_end_matches(['\r', '\n']);
                tracing::debug!(target: "agent", "{}", text);
                if readiness.observe(text) {
                    tracing::info!("agent is ready");
                }
            }
            Err(error) => {
                tracing::debug!("stopped reading agent output: {}", error);
                break;
            }
        }
    }
}

/// Boot the agent and wait for the command channel to return
///
/// Interrupts are caught ([`SignalPolicy::Catch`]): the agent is stopped by cancelling
/// `scope`, never by the terminal. `state` is marked down on return, after all output was
/// scanned, so readiness is always observed before down when the agent announced it.
pub async fn run_launcher(
    exec: Arc<dyn InteractiveExec>,
    target: Target,
    script: String,
    state: Arc<SessionState>,
    readiness: ReadinessWatch,
    scope: CancellationToken,
) -> anyhow::Result<()> {
    tracing::info!(
        "booting agent in task {} container {}",
        target.task_id(),
        target.container
    );
    let _down = state.down_guard();
    let (writer, reader) = tokio::io::duplex(OUTPUT_PIPE_CAPACITY);
    let scanner = tokio::spawn(scan_output(reader, readiness));
    let result = exec
        .exec(&target, &script, SignalPolicy::Catch, Box::new(writer), scope)
        .await;
    // the output sink is gone by now, the scanner drains what is left and stops
    if let Err(error) = scanner.await {
        tracing::warn!("agent output scanner failed: {}", error);
    }
    match &result {
        Ok(()) if state.succeeded() => tracing::info!("agent stopped"),
        Ok(()) => tracing::warn!("agent exited before the transfer completed"),
        Err(error) if state.succeeded() => tracing::debug!("agent stopped: {:#}", error),
        Err(error) => tracing::error!("failed to boot agent: {:#}", error),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use remote::BoxedWrite;
    use tokio::io::AsyncWriteExt;

    struct ScriptedExec {
        output: &'static [u8],
        fail: bool,
    }

    #[async_trait::async_trait]
    impl InteractiveExec for ScriptedExec {
        async fn exec(
            &self,
            _target: &Target,
            _command: &str,
            policy: SignalPolicy,
            mut output: BoxedWrite,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            assert_eq!(policy, SignalPolicy::Catch);
            output.write_all(self.output).await?;
            if self.fail {
                anyhow::bail!("command exited with status 1");
            }
            Ok(())
        }
    }

    fn target() -> Target {
        Target {
            cluster: "prod".to_string(),
            task_arn: "arn:aws:ecs:us-east-1:123456789012:task/prod/0123abcd".to_string(),
            container: "app".to_string(),
            runtime_id: None,
        }
    }

    async fn launch(exec: ScriptedExec) -> (anyhow::Result<()>, bool, Arc<SessionState>) {
        let state = Arc::new(SessionState::default());
        let (readiness, mut ready) = ReadinessWatch::new();
        let result = run_launcher(
            Arc::new(exec),
            target(),
            "true".to_string(),
            state.clone(),
            readiness,
            CancellationToken::new(),
        )
        .await;
        (result, ready.try_recv().is_ok(), state)
    }

    #[tokio::test]
    async fn readiness_seen_before_down() {
        let (result, ready, state) = launch(ScriptedExec {
            output: b"Starting session\r\nlistening on port 12345\r\nlistening on port 12345\n",
            fail: false,
        })
        .await;
        assert!(result.is_ok());
        assert!(ready);
        assert!(state.is_down());
    }

    #[tokio::test]
    async fn marker_on_last_unterminated_line() {
        let (_, ready, _) = launch(ScriptedExec {
            output: b"listening on port 1",
            fail: false,
        })
        .await;
        assert!(ready);
    }

    #[tokio::test]
    async fn failure_without_readiness() {
        let (result, ready, state) = launch(ScriptedExec {
            output: b"sh: base64: not found\n",
            fail: true,
        })
        .await;
        assert!(result.is_err());
        assert!(!ready);
        assert!(state.is_down());
    }
}
