//! Tunnel coordinator

use std::sync::Arc;

use remote::tunnel::PortTunnel;
use remote::{PortPair, Target};
use tokio_util::sync::CancellationToken;

use crate::session::SessionState;

/// Keep the port tunnel up until `scope` is cancelled
///
/// Does not wait for the agent: the transfer client retries its dial until the agent
/// listens behind the tunnel. A tunnel failure after a successful transfer is expected
/// noise and only logged at debug level.
pub async fn run_tunnel(
    tunnel: Arc<dyn PortTunnel>,
    target: Target,
    ports: PortPair,
    state: Arc<SessionState>,
    scope: CancellationToken,
) -> anyhow::Result<()> {
    tracing::info!(
        "starting port forwarding to task {} container {} port {}",
        target.task_id(),
        target.container,
        ports.remote
    );
    let result = tunnel.forward(&target, ports, scope).await;
    match &result {
        Ok(()) => tracing::debug!("port forwarding stopped"),
        Err(error) if state.succeeded() => {
            tracing::debug!("port forwarding stopped: {:#}", error);
        }
        Err(error) => tracing::error!("port forwarding failed: {:#}", error),
    }
    result
}
