//! Remote side of taskcp: everything that touches the container or the wire
//!
//! - [`payload`] picks the embedded static agent build for the task's CPU architecture
//! - [`bootstrap`] renders the shell command that materializes and starts the agent
//! - [`exec`], [`tunnel`] and [`resolve`] define the collaborator contracts for the
//!   interactive command channel, the port tunnel and target resolution
//! - [`aws`] implements those contracts on top of the `aws` CLI
//! - [`client`] is the TCP client that talks to the agent through the tunnel

use tokio::io::AsyncWrite;

pub mod aws;
pub mod bootstrap;
pub mod client;
pub mod exec;
pub mod payload;
pub mod resolve;
pub mod tunnel;

/// Type alias for boxed write stream handed to collaborators as an output sink
pub type BoxedWrite = Box<dyn AsyncWrite + Unpin + Send>;

/// Concrete container inside a running task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Cluster name or ARN the task runs in
    pub cluster: String,
    pub task_arn: String,
    pub container: String,
    /// Container runtime id, needed to address the container for port tunnels
    pub runtime_id: Option<String>,
}

impl Target {
    /// Task id, the last component of the task ARN
    pub fn task_id(&self) -> &str {
        self.task_arn
            .rsplit('/')
            .next()
            .unwrap_or(self.task_arn.as_str())
    }

    /// Cluster name as embedded in a long-format task ARN
    /// (`arn:aws:ecs:region:account:task/cluster/id`), falling back to the configured cluster
    pub fn cluster_name(&self) -> &str {
        let mut parts = self.task_arn.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(cluster), Some(_)) => cluster,
            _ => self
                .cluster
                .rsplit('/')
                .next()
                .unwrap_or(self.cluster.as_str()),
        }
    }
}

/// Transfer direction, as seen by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// local -> remote
    Upload,
    /// remote -> local
    Download,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Upload => write!(f, "upload"),
            Direction::Download => write!(f, "download"),
        }
    }
}

/// Local and remote ports of a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPair {
    pub local: u16,
    pub remote: u16,
}

impl PortPair {
    /// Same port on both ends
    pub fn same(port: u16) -> Self {
        Self {
            local: port,
            remote: port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(task_arn: &str) -> Target {
        Target {
            cluster: "arn:aws:ecs:us-east-1:123456789012:cluster/fallback".to_string(),
            task_arn: task_arn.to_string(),
            container: "app".to_string(),
            runtime_id: None,
        }
    }

    #[test]
    fn task_id_and_cluster_from_long_arn() {
        let t = target("arn:aws:ecs:us-east-1:123456789012:task/prod/0123abcd");
        assert_eq!(t.task_id(), "0123abcd");
        assert_eq!(t.cluster_name(), "prod");
    }

    #[test]
    fn cluster_falls_back_for_short_arn() {
        let t = target("arn:aws:ecs:us-east-1:123456789012:task/0123abcd");
        assert_eq!(t.task_id(), "0123abcd");
        assert_eq!(t.cluster_name(), "fallback");
    }
}
