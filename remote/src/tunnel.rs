//! Port tunnel contract

use crate::{PortPair, Target};

/// Bridges a local TCP port to a port inside a container
#[async_trait::async_trait]
pub trait PortTunnel: Send + Sync {
    /// Keep the tunnel open until `cancel` fires or the tunnel fails
    ///
    /// There is no readiness signal: the local port may refuse connections until both the
    /// tunnel and the remote listener are up, callers are expected to retry.
    async fn forward(
        &self,
        target: &Target,
        ports: PortPair,
        cancel: tokio_util::sync::CancellationToken,
    ) -> anyhow::Result<()>;
}
