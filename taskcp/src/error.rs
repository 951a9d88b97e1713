/// Failure of a copy, named after the phase that failed
///
/// The display text names the phase only; the underlying cause is exposed as the error
/// source, so `{:#}` on an `anyhow::Error` built from this prints the whole chain once.
#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    /// Invalid request, detected before anything remote is started
    #[error("invalid copy request: {0}")]
    Config(String),
    #[error("failed to resolve the target task")]
    Resolve(#[source] anyhow::Error),
    /// The agent exited before announcing that it listens
    #[error("agent stopped before becoming ready")]
    AgentStopped,
    /// Connection attempts were abandoned, the agent went down or the copy was interrupted
    #[error("could not connect to the agent through local port {port}")]
    Dial { port: u16 },
    #[error("transfer failed")]
    Transfer(#[source] anyhow::Error),
}

impl CopyError {
    pub fn config(message: impl Into<String>) -> Self {
        CopyError::Config(message.into())
    }

    /// Short phase name used in logs
    pub fn phase(&self) -> &'static str {
        match self {
            CopyError::Config(_) => "config",
            CopyError::Resolve(_) => "resolve",
            CopyError::AgentStopped => "readiness",
            CopyError::Dial { .. } => "dial",
            CopyError::Transfer(_) => "transfer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_is_printed_once() {
        let cause = anyhow::anyhow!("connection reset").context("failed to send");
        let error = anyhow::Error::from(CopyError::Transfer(cause));
        assert_eq!(
            format!("{error:#}"),
            "transfer failed: failed to send: connection reset"
        );
    }

    #[test]
    fn readiness_failure_message() {
        assert_eq!(
            CopyError::AgentStopped.to_string(),
            "agent stopped before becoming ready"
        );
        assert_eq!(CopyError::AgentStopped.phase(), "readiness");
    }
}
