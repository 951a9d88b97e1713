use std::sync::Arc;

use clap::Parser;
use remote::aws::{AwsCli, AwsExec, AwsResolver, AwsTunnel};
use remote::client::DialPolicy;
use remote::resolve::{TargetQuery, TargetResolver};
use tokio_util::sync::CancellationToken;

use taskcp::path::{CopyRequest, Endpoint};
use taskcp::{CopyError, DEFAULT_PORT, TransferSummary, TransferTask};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskcp",
    version,
    about = "Copy a file into or out of a running ECS container",
    long_about = "`taskcp` copies a single file between the local machine and a container of a running ECS task.

It needs nothing inside the container besides `sh` and `base64`: a small static agent is shipped through `aws ecs execute-command`, and the data flows over an SSM port forwarding session. The `aws` CLI and `session-manager-plugin` must be installed locally.

One of SOURCE and DEST is remote, written as `TOKEN:path`. TOKEN is a task id, or `_` for the task selected with --id, --family or --service. A DEST ending with `/` receives the basename of SOURCE. A local DEST of `-` writes to stdout.

EXAMPLES:
    # Upload into /tmp/ of the only running task of a service
    taskcp --cluster prod --service web README.md _:/tmp/

    # Download from a specific task and container
    taskcp --cluster prod --container app 0123456789abcdef:/var/log/app.log ./

    # Stream a remote file to stdout
    taskcp --cluster prod --family worker _:/etc/hosts -"
)]
struct Args {
    // Transfer options
    /// Port used by the agent inside the container and by the local end of the tunnel
    #[arg(
        long,
        default_value_t = DEFAULT_PORT,
        value_name = "PORT",
        help_heading = "Transfer options"
    )]
    port: u16,

    // Target selection
    /// ECS cluster name or ARN
    #[arg(
        long,
        env = "TASKCP_CLUSTER",
        value_name = "CLUSTER",
        help_heading = "Target selection"
    )]
    cluster: Option<String>,

    /// Task id or ARN, used when the endpoint token is `_`
    #[arg(long, value_name = "TASK", help_heading = "Target selection")]
    id: Option<String>,

    /// Only consider tasks of this task definition family
    #[arg(long, value_name = "FAMILY", help_heading = "Target selection")]
    family: Option<String>,

    /// Only consider tasks of this service
    #[arg(long, value_name = "SERVICE", help_heading = "Target selection")]
    service: Option<String>,

    /// Container name, required when the task runs more than one container
    #[arg(long, value_name = "NAME", help_heading = "Target selection")]
    container: Option<String>,

    /// AWS region, passed through to the `aws` CLI
    #[arg(long, value_name = "REGION", help_heading = "Target selection")]
    region: Option<String>,

    // Progress & output
    /// Show a progress bar (default)
    #[arg(long, overrides_with = "no_progress", help_heading = "Progress & output")]
    progress: bool,

    /// Don't show a progress bar
    #[arg(long, overrides_with = "progress", help_heading = "Progress & output")]
    no_progress: bool,

    /// Verbose level: -v INFO / -vv DEBUG / -vvv TRACE (default: WARN)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Quiet mode, don't report errors or the summary
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    // Advanced settings
    /// Number of worker threads (0 = number of CPU cores)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    // ARGUMENTS
    /// Source: local path or `TOKEN:path`
    #[arg()]
    source: String,

    /// Destination: local path, `-` for stdout, or `TOKEN:path`
    #[arg()]
    dest: String,
}

impl Args {
    /// The later of --progress/--no-progress wins, on by default
    fn show_progress(&self) -> bool {
        self.progress || !self.no_progress
    }

    fn target_query(&self) -> TargetQuery {
        TargetQuery {
            cluster: self.cluster.clone(),
            task_id: self.id.clone(),
            family: self.family.clone(),
            service: self.service.clone(),
            container: self.container.clone(),
        }
    }
}

async fn async_main(args: Args) -> anyhow::Result<TransferSummary> {
    let request = CopyRequest::new(Endpoint::parse(&args.source), Endpoint::parse(&args.dest))?;
    tracing::info!(
        "{} {:?} <-> {:?}",
        request.direction,
        request.local_path,
        request.remote_path
    );
    let cli = AwsCli::new(args.region.clone());
    let resolved = AwsResolver::new(cli.clone())
        .resolve(&request.narrow(args.target_query()))
        .await
        .map_err(CopyError::Resolve)?;
    let task = TransferTask::new(request, resolved, args.port, args.show_progress());
    task.payload()
        .ensure_bundled()
        .map_err(|error| CopyError::config(format!("{error:#}")))?;
    let scope = CancellationToken::new();
    // the agent runs in its own process group, Ctrl-C reaches only us and becomes a
    // cancellation of the whole copy
    let interrupt = {
        let scope = scope.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, stopping the agent and the tunnel");
                scope.cancel();
            }
        })
    };
    let report = taskcp::run_copy(
        &task,
        Arc::new(AwsExec::new(cli.clone())),
        Arc::new(AwsTunnel::new(cli)),
        &DialPolicy::default(),
        scope,
    )
    .await;
    interrupt.abort();
    tracing::debug!(
        "launcher: {:?}, tunnel: {:?}",
        report.launcher,
        report.tunnel
    );
    Ok(report.into_result()?)
}

fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: true,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
    };
    let res = common::run(output, runtime, func);
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
