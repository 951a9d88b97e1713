//! Collaborators backed by the `aws` command line tool
//!
//! Both the interactive command channel and the port tunnel are SSM sessions driven by
//! `session-manager-plugin`; we never speak that protocol ourselves, we only run the CLI
//! and supervise the child process.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::exec::{InteractiveExec, SignalPolicy};
use crate::resolve::{ResolvedTarget, TargetQuery, TargetResolver};
use crate::tunnel::PortTunnel;
use crate::{BoxedWrite, PortPair, Target};

/// SSM document that bridges a local port to a port inside the container
pub const PORT_FORWARDING_DOCUMENT: &str = "AWS-StartPortForwardingSession";
/// Task attribute carrying the CPU architecture of the task's host
pub const CPU_ARCHITECTURE_ATTRIBUTE: &str = "ecs.cpu-architecture";
/// `describe-tasks` accepts at most this many tasks per call
const DESCRIBE_TASKS_BATCH: usize = 100;

/// How to invoke the `aws` CLI
#[derive(Debug, Clone)]
pub struct AwsCli {
    program: String,
    region: Option<String>,
}

impl Default for AwsCli {
    fn default() -> Self {
        Self::new(None)
    }
}

impl AwsCli {
    pub fn new(region: Option<String>) -> Self {
        Self {
            program: "aws".to_string(),
            region,
        }
    }

    /// Use a different executable, e.g. a wrapper script
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn command<I, S>(&self, args: I) -> tokio::process::Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(args);
        if let Some(region) = &self.region {
            cmd.arg("--region").arg(region);
        }
        cmd.kill_on_drop(true);
        cmd
    }

    /// Run a non-interactive call and parse its JSON output
    async fn json<T: serde::de::DeserializeOwned>(&self, args: &[&str]) -> anyhow::Result<T> {
        tracing::debug!("running {} {}", self.program, args.join(" "));
        let output = self
            .command(args)
            .args(["--output", "json"])
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("failed to run {:?}", self.program))?;
        if !output.status.success() {
            return Err(anyhow!(
                "{} {} failed ({}): {}",
                self.program,
                args.first().copied().unwrap_or_default(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        serde_json::from_slice(&output.stdout)
            .with_context(|| {
                format!(
                    "failed to parse output of {} {}",
                    self.program,
                    args.join(" ")
                )
            })
    }
}

/// Wait for `child` to exit or kill it once `cancel` fires
///
/// A cancelled child is not an error, an unsuccessful exit is.
async fn supervise(
    child: &mut tokio::process::Child,
    what: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    tokio::select! {
        status = child.wait() => {
            let status = status.with_context(|| format!("failed waiting for {what}"))?;
            if status.success() {
                tracing::debug!("{} exited", what);
                Ok(())
            } else {
                Err(anyhow!("{what} exited with {status}"))
            }
        }
        _ = cancel.cancelled() => {
            tracing::debug!("stopping {}", what);
            child.kill().await.with_context(|| format!("failed to stop {what}"))?;
            Ok(())
        }
    }
}

/// Copy a child pipe into the shared output sink
async fn pump_into(
    mut pipe: impl AsyncRead + Unpin,
    sink: Arc<tokio::sync::Mutex<BoxedWrite>>,
) -> std::io::Result<()> {
    let mut buf = vec![0u8; 8192];
    loop {
        let n = pipe.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let mut sink = sink.lock().await;
        sink.write_all(&buf[..n]).await?;
        sink.flush().await?;
    }
    Ok(())
}

/// Log every line of a child pipe at debug level
async fn log_lines(pipe: impl AsyncRead + Unpin) {
    let mut lines = tokio::io::BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "tunnel", "{}", line);
    }
}

/// Collect the output readers of a child that is gone
///
/// After a kill the readers are aborted instead of drained: helpers spawned by the CLI
/// may keep the pipes open.
async fn stop_readers(readers: Vec<tokio::task::JoinHandle<()>>, drain: bool) {
    for reader in readers {
        if !drain {
            reader.abort();
        }
        let Err(error) = reader.await else {
            continue;
        };
        if !error.is_cancelled() {
            tracing::warn!("output reader failed: {:#}", error);
        }
    }
}

/// `aws ecs execute-command --interactive`
#[derive(Debug, Clone, Default)]
pub struct AwsExec {
    cli: AwsCli,
}

impl AwsExec {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    fn args<'a>(target: &'a Target, command: &'a str) -> Vec<&'a str> {
        vec![
            "ecs",
            "execute-command",
            "--cluster",
            target.cluster.as_str(),
            "--task",
            target.task_arn.as_str(),
            "--container",
            target.container.as_str(),
            "--interactive",
            "--command",
            command,
        ]
    }
}

#[async_trait::async_trait]
impl InteractiveExec for AwsExec {
    async fn exec(
        &self,
        target: &Target,
        command: &str,
        policy: SignalPolicy,
        output: BoxedWrite,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let mut cmd = self.cli.command(Self::args(target, command));
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        if policy == SignalPolicy::Catch {
            // terminal interrupts go to the foreground process group only
            cmd.process_group(0);
        }
        #[cfg(not(unix))]
        let _ = policy;
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to run {:?}", self.cli.program))?;
        // the session ends when its stdin closes, keep it open until the child is done
        let stdin = child.stdin.take();
        let sink = Arc::new(tokio::sync::Mutex::new(output));
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            let sink = sink.clone();
            readers.push(tokio::spawn(async move {
                if let Err(error) = pump_into(stdout, sink).await {
                    tracing::debug!("stopped copying command stdout: {}", error);
                }
            }));
        }
        if let Some(stderr) = child.stderr.take() {
            let sink = sink.clone();
            readers.push(tokio::spawn(async move {
                if let Err(error) = pump_into(stderr, sink).await {
                    tracing::debug!("stopped copying command stderr: {}", error);
                }
            }));
        }
        drop(sink);
        let result = supervise(&mut child, "execute-command session", &cancel).await;
        stop_readers(readers, !cancel.is_cancelled()).await;
        drop(stdin);
        result
    }
}

/// `aws ssm start-session` with the port forwarding document
#[derive(Debug, Clone, Default)]
pub struct AwsTunnel {
    cli: AwsCli,
}

impl AwsTunnel {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    /// SSM target name of a container: `ecs:<cluster>_<task id>_<runtime id>`
    pub fn session_target(target: &Target) -> anyhow::Result<String> {
        let runtime_id = target.runtime_id.as_deref().ok_or_else(|| {
            anyhow!(
                "container {:?} of task {} has no runtime id, is it running?",
                target.container,
                target.task_id()
            )
        })?;
        Ok(format!(
            "ecs:{}_{}_{}",
            target.cluster_name(),
            target.task_id(),
            runtime_id
        ))
    }

    pub fn parameters(ports: PortPair) -> String {
        serde_json::json!({
            "portNumber": [ports.remote.to_string()],
            "localPortNumber": [ports.local.to_string()],
        })
        .to_string()
    }
}

#[async_trait::async_trait]
impl PortTunnel for AwsTunnel {
    async fn forward(
        &self,
        target: &Target,
        ports: PortPair,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let session_target = Self::session_target(target)?;
        let parameters = Self::parameters(ports);
        tracing::info!(
            "forwarding local port {} to {} port {}",
            ports.local,
            session_target,
            ports.remote
        );
        let mut child = self
            .cli
            .command([
                "ssm",
                "start-session",
                "--target",
                session_target.as_str(),
                "--document-name",
                PORT_FORWARDING_DOCUMENT,
                "--parameters",
                parameters.as_str(),
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to run {:?}", self.cli.program))?;
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(log_lines(stdout)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(log_lines(stderr)));
        }
        let result = supervise(&mut child, "port forwarding session", &cancel).await;
        stop_readers(readers, !cancel.is_cancelled()).await;
        result
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTasksOutput {
    #[serde(default)]
    task_arns: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeTasksOutput {
    #[serde(default)]
    tasks: Vec<TaskDescription>,
    #[serde(default)]
    failures: Vec<Failure>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskDescription {
    task_arn: String,
    cluster_arn: String,
    #[serde(default)]
    last_status: Option<String>,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    attributes: Vec<Attribute>,
    #[serde(default)]
    containers: Vec<ContainerDescription>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Attribute {
    name: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerDescription {
    name: String,
    #[serde(default)]
    runtime_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Failure {
    #[serde(default)]
    arn: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

impl TaskDescription {
    fn is_stopped(&self) -> bool {
        self.last_status.as_deref() == Some("STOPPED")
    }

    fn architecture(&self) -> Option<String> {
        self.attributes
            .iter()
            .find(|attr| attr.name == CPU_ARCHITECTURE_ATTRIBUTE)
            .and_then(|attr| attr.value.clone())
    }

    fn describe(&self) -> String {
        format!(
            "{} ({})",
            self.task_arn,
            self.group.as_deref().unwrap_or("no group")
        )
    }
}

/// Exactly one live task must remain
fn pick_task(tasks: Vec<TaskDescription>) -> anyhow::Result<TaskDescription> {
    let mut live: Vec<TaskDescription> = tasks.into_iter().filter(|t| !t.is_stopped()).collect();
    match live.len() {
        0 => Err(anyhow!("no running task matches")),
        1 => Ok(live.remove(0)),
        _ => Err(anyhow!(
            "{} tasks match, narrow the selection with --id:\n  {}",
            live.len(),
            live.iter()
                .map(TaskDescription::describe)
                .collect::<Vec<_>>()
                .join("\n  ")
        )),
    }
}

fn pick_container(
    task: &TaskDescription,
    name: Option<&str>,
) -> anyhow::Result<ContainerDescription> {
    let names = || {
        task.containers
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    match name {
        Some(name) => task
            .containers
            .iter()
            .find(|c| c.name == name)
            .cloned()
            .ok_or_else(|| {
                anyhow!(
                    "task {} has no container named {:?}, available: {}",
                    task.task_arn,
                    name,
                    names()
                )
            }),
        None => match task.containers.as_slice() {
            [only] => Ok(only.clone()),
            [] => Err(anyhow!("task {} has no containers", task.task_arn)),
            _ => Err(anyhow!(
                "task {} has several containers, pick one with --container: {}",
                task.task_arn,
                names()
            )),
        },
    }
}

fn into_resolved(
    task: TaskDescription,
    container_name: Option<&str>,
) -> anyhow::Result<ResolvedTarget> {
    let container = pick_container(&task, container_name)?;
    let architecture = task.architecture();
    Ok(ResolvedTarget {
        target: Target {
            cluster: task.cluster_arn,
            task_arn: task.task_arn,
            container: container.name,
            runtime_id: container.runtime_id,
        },
        architecture,
    })
}

/// Resolves targets with `aws ecs list-tasks` and `aws ecs describe-tasks`
#[derive(Debug, Clone, Default)]
pub struct AwsResolver {
    cli: AwsCli,
}

impl AwsResolver {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    async fn list_tasks(&self, query: &TargetQuery) -> anyhow::Result<Vec<String>> {
        let mut args = vec!["ecs", "list-tasks", "--desired-status", "RUNNING"];
        if let Some(cluster) = &query.cluster {
            args.extend(["--cluster", cluster.as_str()]);
        }
        if let Some(family) = &query.family {
            args.extend(["--family", family.as_str()]);
        }
        if let Some(service) = &query.service {
            args.extend(["--service-name", service.as_str()]);
        }
        let listed: ListTasksOutput = self
            .cli
            .json(&args)
            .await
            .context("failed to list tasks")?;
        Ok(listed.task_arns)
    }

    async fn describe_tasks(
        &self,
        cluster: Option<&str>,
        task_arns: &[String],
    ) -> anyhow::Result<Vec<TaskDescription>> {
        let mut tasks = Vec::with_capacity(task_arns.len());
        for batch in task_arns.chunks(DESCRIBE_TASKS_BATCH) {
            let mut args = vec!["ecs", "describe-tasks"];
            if let Some(cluster) = cluster {
                args.extend(["--cluster", cluster]);
            }
            args.push("--tasks");
            args.extend(batch.iter().map(String::as_str));
            let described: DescribeTasksOutput = self
                .cli
                .json(&args)
                .await
                .context("failed to describe tasks")?;
            for failure in &described.failures {
                tracing::warn!(
                    "could not describe task {}: {}",
                    failure.arn.as_deref().unwrap_or("?"),
                    failure.reason.as_deref().unwrap_or("unknown reason")
                );
            }
            tasks.extend(described.tasks);
        }
        Ok(tasks)
    }
}

#[async_trait::async_trait]
impl TargetResolver for AwsResolver {
    async fn resolve(&self, query: &TargetQuery) -> anyhow::Result<ResolvedTarget> {
        let task_arns = match &query.task_id {
            Some(id) => vec![id.clone()],
            None => self.list_tasks(query).await?,
        };
        let tasks = self
            .describe_tasks(query.cluster.as_deref(), &task_arns)
            .await?;
        let task = pick_task(tasks)?;
        tracing::info!("selected task {}", task.task_arn);
        into_resolved(task, query.container.as_deref())
    }
}
