//! In-process doubles for the interactive command channel and the port tunnel.
//!
//! The exec double plays the container: it reads the agent start line out of the
//! bootstrap command and serves the transfer with the real agent library, with the
//! redirected file as the agent's stdin or stdout. The agent listens on the local port
//! directly, so the tunnel double only has to stay up until it is cancelled.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use remote::exec::{InteractiveExec, SignalPolicy};
use remote::resolve::ResolvedTarget;
use remote::tunnel::PortTunnel;
use remote::{BoxedWrite, PortPair, Target};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Order in which the doubles finished
pub type Events = Arc<Mutex<Vec<&'static str>>>;

pub fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub fn resolved_target(architecture: Option<&str>) -> ResolvedTarget {
    ResolvedTarget {
        target: Target {
            cluster: "arn:aws:ecs:us-east-1:123456789012:cluster/test".to_string(),
            task_arn: "arn:aws:ecs:us-east-1:123456789012:task/test/0123abcd".to_string(),
            container: "app".to_string(),
            runtime_id: Some("0123abcd-1111".to_string()),
        },
        architecture: architecture.map(str::to_string),
    }
}

/// Agent start line of a bootstrap command: `<agent> <port> <redirect> "<file>"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommand {
    pub port: u16,
    pub redirect: String,
    pub file: String,
}

pub fn parse_agent_command(script: &str) -> AgentCommand {
    let line = script
        .lines()
        .rev()
        .find(|line| line.starts_with(remote::bootstrap::AGENT_INSTALL_PATH))
        .expect("bootstrap command starts the agent");
    let mut parts = line.splitn(4, ' ');
    let _agent = parts.next();
    let port = parts.next().unwrap().parse().unwrap();
    let redirect = parts.next().unwrap().to_string();
    let file = parts.next().unwrap().trim_matches('"').to_string();
    AgentCommand {
        port,
        redirect,
        file,
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AgentBehavior {
    /// Announce readiness and serve one transfer
    Serve,
    /// Announce readiness, but only listen after a delay
    ListenLate(Duration),
    /// Fail before printing the readiness marker
    ExitBeforeReady,
    /// Print nothing useful until cancelled
    Hang,
}

pub struct FakeExec {
    behavior: AgentBehavior,
    events: Events,
    pub commands: Arc<Mutex<Vec<String>>>,
}

impl FakeExec {
    pub fn new(behavior: AgentBehavior, events: Events) -> Self {
        Self {
            behavior,
            events,
            commands: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

async fn serve_agent(
    command: &str,
    output: &mut BoxedWrite,
    listen_delay: Duration,
) -> anyhow::Result<()> {
    let agent_command = parse_agent_command(command);
    output
        .write_all(b"Starting session with SessionId: ecs-execute-command-test\r\n")
        .await?;
    output
        .write_all(format!("{}\r\n", agent::ready_line(agent_command.port)).as_bytes())
        .await?;
    tokio::time::sleep(listen_delay).await;
    let listener = agent::bind(agent_command.port).await?;
    match agent_command.redirect.as_str() {
        ">" => {
            let file = tokio::fs::File::create(&agent_command.file).await?;
            agent::serve(listener, tokio::io::empty(), file).await?;
        }
        "<" => {
            let file = tokio::fs::File::open(&agent_command.file).await?;
            agent::serve(listener, file, tokio::io::sink()).await?;
        }
        other => anyhow::bail!("unexpected redirection {other:?}"),
    }
    Ok(())
}

#[async_trait::async_trait]
impl InteractiveExec for FakeExec {
    async fn exec(
        &self,
        _target: &Target,
        command: &str,
        policy: SignalPolicy,
        mut output: BoxedWrite,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        assert_eq!(policy, SignalPolicy::Catch);
        self.commands.lock().unwrap().push(command.to_string());
        let result = match self.behavior {
            AgentBehavior::Serve | AgentBehavior::ListenLate(_) => {
                let delay = match self.behavior {
                    AgentBehavior::ListenLate(delay) => delay,
                    _ => Duration::ZERO,
                };
                tokio::select! {
                    res = serve_agent(command, &mut output, delay) => res,
                    _ = cancel.cancelled() => Ok(()),
                }
            }
            AgentBehavior::ExitBeforeReady => {
                output.write_all(b"sh: 1: base64: not found\n").await?;
                Err(anyhow::anyhow!("command exited with status 127"))
            }
            AgentBehavior::Hang => {
                cancel.cancelled().await;
                Ok(())
            }
        };
        drop(output);
        self.events.lock().unwrap().push("launcher");
        result
    }
}

pub struct FakeTunnel {
    events: Events,
    pub forwarded: Arc<Mutex<Vec<PortPair>>>,
}

impl FakeTunnel {
    pub fn new(events: Events) -> Self {
        Self {
            events,
            forwarded: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait::async_trait]
impl PortTunnel for FakeTunnel {
    async fn forward(
        &self,
        _target: &Target,
        ports: PortPair,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        self.forwarded.lock().unwrap().push(ports);
        cancel.cancelled().await;
        self.events.lock().unwrap().push("tunnel");
        Ok(())
    }
}
