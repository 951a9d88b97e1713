//! Interactive command execution contract

use crate::{BoxedWrite, Target};

/// How a remote command interacts with operator interrupts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalPolicy {
    /// Terminal interrupts reach the remote command as usual
    #[default]
    Propagate,
    /// The remote command is shielded from terminal interrupts; the caller catches them
    /// and stops the command through its cancellation token instead
    Catch,
}

/// Runs a command inside a container over the interactive command channel
#[async_trait::async_trait]
pub trait InteractiveExec: Send + Sync {
    /// Run `command` in `target`, copying its combined stdout/stderr into `output`
    ///
    /// Returns once the remote command ends (for any reason) or `cancel` fires; in the
    /// latter case the remote command is stopped before returning. `output` must be
    /// dropped by the time this returns so readers observe EOF.
    async fn exec(
        &self,
        target: &Target,
        command: &str,
        policy: SignalPolicy,
        output: BoxedWrite,
        cancel: tokio_util::sync::CancellationToken,
    ) -> anyhow::Result<()>;
}
