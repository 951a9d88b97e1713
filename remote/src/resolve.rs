//! Target resolution contract

use crate::Target;

/// What the operator told us about the task and container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetQuery {
    pub cluster: Option<String>,
    /// Explicit task id or ARN
    pub task_id: Option<String>,
    pub family: Option<String>,
    pub service: Option<String>,
    pub container: Option<String>,
}

/// A concrete container plus the task metadata the copy needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub target: Target,
    /// CPU architecture reported for the task, if any
    pub architecture: Option<String>,
}

/// Turns a [`TargetQuery`] into a concrete task and container
#[async_trait::async_trait]
pub trait TargetResolver: Send + Sync {
    async fn resolve(&self, query: &TargetQuery) -> anyhow::Result<ResolvedTarget>;
}
