use remote::bootstrap::{AGENT_INSTALL_PATH, BootstrapSpec};
use remote::payload::{Architecture, Payload};
use remote::resolve::ResolvedTarget;
use remote::{Direction, PortPair, Target};

use crate::path::CopyRequest;

/// Port used for both the tunnel and the agent listener unless overridden
pub const DEFAULT_PORT: u16 = 12345;

/// Everything one copy needs, built once per invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    pub target: Target,
    pub architecture: Architecture,
    pub direction: Direction,
    pub local_path: String,
    pub remote_path: String,
    pub port: u16,
    pub show_progress: bool,
}

impl TransferTask {
    pub fn new(
        request: CopyRequest,
        resolved: ResolvedTarget,
        port: u16,
        show_progress: bool,
    ) -> Self {
        Self {
            architecture: Architecture::from_reported(resolved.architecture.as_deref()),
            target: resolved.target,
            direction: request.direction,
            local_path: request.local_path,
            remote_path: request.remote_path,
            port,
            show_progress,
        }
    }

    pub fn ports(&self) -> PortPair {
        PortPair::same(self.port)
    }

    /// Agent build matching the task's architecture
    pub fn payload(&self) -> Payload {
        remote::payload::select(&self.architecture)
    }

    pub fn bootstrap_script(&self, payload: &Payload) -> String {
        remote::bootstrap::render(&BootstrapSpec {
            payload: payload.bytes(),
            install_path: AGENT_INSTALL_PATH,
            port: self.port,
            direction: self.direction,
            remote_path: &self.remote_path,
        })
    }
}
