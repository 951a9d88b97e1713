//! Lifecycle and teardown of one copy
//!
//! ```text
//! Starting -> WaitingForReadiness -> Transferring -> Succeeded | Failed -> TearingDown -> Done
//! ```
//!
//! The launcher and the tunnel run as two tasks under one cancellation scope. Teardown
//! always waits for the launcher to end before cancelling the scope, and only then waits
//! for the tunnel: the tunnel must outlive any write the agent may still be finishing.
//! Their results are collected into the [`CopyReport`]; only the transfer's own result is
//! returned to the caller, the rest is logged.

use std::sync::Arc;

use remote::Direction;
use remote::client::{DialPolicy, STDOUT_SENTINEL, TransferClient};
use remote::exec::InteractiveExec;
use remote::tunnel::PortTunnel;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::CopyError;
use crate::session::{AgentSession, ReadinessWatch, SessionState};
use crate::task::TransferTask;

/// Host the tunnel listens on
pub const LOCAL_HOST: &str = "localhost";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    WaitingForReadiness,
    Transferring,
    Succeeded,
    Failed,
    TearingDown,
    Done,
}

fn enter(phase: Phase) {
    tracing::debug!("copy phase: {:?}", phase);
}

/// How a background operation (launcher or tunnel) ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationEnd {
    Completed,
    Failed(String),
    Panicked(String),
}

impl OperationEnd {
    fn from_join(joined: Result<anyhow::Result<()>, tokio::task::JoinError>) -> Self {
        match joined {
            Ok(Ok(())) => OperationEnd::Completed,
            Ok(Err(error)) => OperationEnd::Failed(format!("{error:#}")),
            Err(error) => OperationEnd::Panicked(error.to_string()),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, OperationEnd::Completed)
    }
}

/// What a successful copy moved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    pub direction: Direction,
    pub bytes: u64,
    pub destination: String,
    pub elapsed: std::time::Duration,
}

impl std::fmt::Display for TransferSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self.direction {
            Direction::Upload => "uploaded",
            Direction::Download => "downloaded",
        };
        let destination = if self.destination == STDOUT_SENTINEL {
            "stdout"
        } else {
            self.destination.as_str()
        };
        write!(
            f,
            "{verb} {} to {destination} in {}",
            bytesize::ByteSize(self.bytes),
            common::format_elapsed(self.elapsed)
        )
    }
}

/// Outcome of [`run_copy`] including how both background operations ended
#[derive(Debug)]
pub struct CopyReport {
    pub result: Result<TransferSummary, CopyError>,
    pub launcher: OperationEnd,
    pub tunnel: OperationEnd,
}

impl CopyReport {
    /// The result the caller acts on; launcher and tunnel failures were already logged
    pub fn into_result(self) -> Result<TransferSummary, CopyError> {
        self.result
    }
}

/// Readiness wins over down when both already happened
async fn wait_for_readiness(mut ready: oneshot::Receiver<()>, state: &SessionState) -> bool {
    tokio::select! {
        biased;
        Ok(()) = &mut ready => true,
        _ = state.wait_down() => false,
    }
}

async fn transfer(
    task: &TransferTask,
    dial: &DialPolicy,
    state: &SessionState,
) -> Result<u64, CopyError> {
    let mut client = TransferClient::connect(
        LOCAL_HOST,
        task.port,
        task.show_progress,
        dial,
        &state.down_token(),
    )
    .await
    .ok_or(CopyError::Dial { port: task.port })?;
    let transferred = match task.direction {
        Direction::Upload => {
            tracing::info!("sending {:?} to {:?}", task.local_path, task.remote_path);
            client
                .send_file(std::path::Path::new(&task.local_path))
                .await
        }
        Direction::Download => {
            tracing::info!("receiving {:?} into {:?}", task.remote_path, task.local_path);
            client.receive_file(&task.local_path).await
        }
    };
    // set before the connection closes, the agent exits right after and its end is
    // judged by this flag
    if transferred.is_ok() {
        state.mark_succeeded();
    }
    drop(client);
    transferred.map_err(CopyError::Transfer)
}

/// Run one copy end to end
///
/// `scope` covers the launcher and the tunnel. Cancelling it from outside (e.g. on
/// Ctrl-C) stops both and fails the copy; it is always cancelled by the time this
/// returns.
pub async fn run_copy(
    task: &TransferTask,
    exec: Arc<dyn InteractiveExec>,
    tunnel: Arc<dyn PortTunnel>,
    dial: &DialPolicy,
    scope: CancellationToken,
) -> CopyReport {
    let start = std::time::Instant::now();
    enter(Phase::Starting);
    let payload = task.payload();
    let session = AgentSession::new(task, &payload);
    let state = session.state.clone();
    let (readiness, ready) = ReadinessWatch::new();
    let launcher = tokio::spawn(crate::launcher::run_launcher(
        exec,
        task.target.clone(),
        session.script,
        state.clone(),
        readiness,
        scope.clone(),
    ));
    let tunnel = tokio::spawn(crate::tunnel::run_tunnel(
        tunnel,
        task.target.clone(),
        task.ports(),
        state.clone(),
        scope.clone(),
    ));
    enter(Phase::WaitingForReadiness);
    let result = if wait_for_readiness(ready, &state).await {
        enter(Phase::Transferring);
        match transfer(task, dial, &state).await {
            Ok(bytes) => {
                enter(Phase::Succeeded);
                Ok(TransferSummary {
                    direction: task.direction,
                    bytes,
                    destination: match task.direction {
                        Direction::Upload => task.remote_path.clone(),
                        Direction::Download => task.local_path.clone(),
                    },
                    elapsed: start.elapsed(),
                })
            }
            Err(error) => {
                enter(Phase::Failed);
                Err(error)
            }
        }
    } else {
        scope.cancel();
        enter(Phase::Failed);
        Err(CopyError::AgentStopped)
    };
    if let Err(error) = &result {
        tracing::debug!("copy failed in the {} phase: {}", error.phase(), error);
    }
    enter(Phase::TearingDown);
    tracing::info!("waiting for the agent to stop");
    let launcher = OperationEnd::from_join(launcher.await);
    scope.cancel();
    let tunnel = OperationEnd::from_join(tunnel.await);
    enter(Phase::Done);
    CopyReport {
        result,
        launcher,
        tunnel,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_display() {
        let summary = TransferSummary {
            direction: Direction::Upload,
            bytes: 13,
            destination: "/tmp/README.md".to_string(),
            elapsed: std::time::Duration::from_millis(1200),
        };
        assert_eq!(
            summary.to_string(),
            "uploaded 13 B to /tmp/README.md in 1s 200ms"
        );
        let summary = TransferSummary {
            direction: Direction::Download,
            destination: "-".to_string(),
            ..summary
        };
        assert_eq!(summary.to_string(), "downloaded 13 B to stdout in 1s 200ms");
    }

    #[test]
    fn operation_end_from_results() {
        assert!(OperationEnd::from_join(Ok(Ok(()))).is_completed());
        assert_eq!(
            OperationEnd::from_join(Ok(Err(anyhow::anyhow!("exit status 1")))),
            OperationEnd::Failed("exit status 1".to_string())
        );
    }

    #[tokio::test]
    async fn readiness_preferred_over_down() {
        let state = SessionState::default();
        let (tx, rx) = oneshot::channel();
        tx.send(()).unwrap();
        state.mark_down();
        assert!(wait_for_readiness(rx, &state).await);
    }

    #[tokio::test]
    async fn down_without_readiness() {
        let state = SessionState::default();
        let (tx, rx) = oneshot::channel::<()>();
        drop(tx);
        state.mark_down();
        assert!(!wait_for_readiness(rx, &state).await);
    }
}
