//! State shared between the controller, the launcher and the tunnel coordinator

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use remote::payload::Payload;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::task::TransferTask;

/// Flags of one bootstrap + launch attempt
///
/// `succeeded` has a single writer (the controller, after the transfer completed) and is
/// only read to choose log severity. `down` is raised once by the launcher.
#[derive(Debug, Default)]
pub struct SessionState {
    succeeded: AtomicBool,
    down: CancellationToken,
}

impl SessionState {
    pub fn mark_succeeded(&self) {
        self.succeeded.store(true, Ordering::Release);
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded.load(Ordering::Acquire)
    }

    /// The interactive command returned, for whatever reason
    pub fn mark_down(&self) {
        self.down.cancel();
    }

    pub fn is_down(&self) -> bool {
        self.down.is_cancelled()
    }

    pub async fn wait_down(&self) {
        self.down.cancelled().await;
    }

    /// Token that fires once the agent is down, used to abandon dialing
    pub fn down_token(&self) -> CancellationToken {
        self.down.clone()
    }

    /// Marks the session down when dropped, even if the launcher panics
    pub fn down_guard(self: &Arc<Self>) -> DownGuard {
        DownGuard(self.clone())
    }
}

#[derive(Debug)]
pub struct DownGuard(Arc<SessionState>);

impl Drop for DownGuard {
    fn drop(&mut self) {
        self.0.mark_down();
    }
}

/// Raises the readiness signal the first time the marker shows up in agent output
#[derive(Debug)]
pub struct ReadinessWatch {
    marker: &'static str,
    signal: Option<oneshot::Sender<()>>,
}

impl ReadinessWatch {
    pub fn new() -> (Self, oneshot::Receiver<()>) {
        Self::with_marker(agent::READY_MARKER)
    }

    pub fn with_marker(marker: &'static str) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                marker,
                signal: Some(tx),
            },
            rx,
        )
    }

    /// Returns `true` only for the line that raised the signal
    pub fn observe(&mut self, line: &str) -> bool {
        if self.signal.is_none() || !line.contains(self.marker) {
            return false;
        }
        if let Some(signal) = self.signal.take() {
            // nobody waiting anymore is fine, the copy is already being torn down
            let _ = signal.send(());
        }
        true
    }

    pub fn is_ready(&self) -> bool {
        self.signal.is_none()
    }
}

/// Runtime state of one bootstrap + launch attempt
#[derive(Debug)]
pub struct AgentSession {
    pub script: String,
    pub state: Arc<SessionState>,
}

impl AgentSession {
    pub fn new(task: &TransferTask, payload: &Payload) -> Self {
        Self {
            script: task.bootstrap_script(payload),
            state: Arc::new(SessionState::default()),
        }
    }
}
