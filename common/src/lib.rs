//! Common utilities shared by the taskcp crates
//!
//! This crate provides the process harness used by the `taskcp` binary:
//!
//! - [`run`] builds the tokio runtime, installs logging, runs the async entry point and
//!   reports the outcome (summary on success, error chain on failure)
//! - [`config`] holds the runtime and output settings filled from CLI flags
//! - [`progress`] provides byte progress bars and a pass-through counting writer
//!
//! # Logging
//!
//! Logging uses `tracing` with a `tracing-subscriber` fmt layer writing to **stderr**.
//! stdout is reserved for payload data (`taskcp task:/path -` streams the remote file to
//! stdout). The verbosity flag selects the default filter (`-v` INFO, `-vv` DEBUG,
//! `-vvv` TRACE, default WARN); `RUST_LOG` takes precedence when set.

pub mod config;
pub mod progress;

pub use config::OutputConfig;
pub use config::RuntimeConfig;

/// Format a duration for user-facing summaries, rounded to milliseconds
pub fn format_elapsed(elapsed: std::time::Duration) -> String {
    let rounded = std::time::Duration::from_millis(elapsed.as_millis() as u64);
    humantime::format_duration(rounded).to_string()
}

fn init_logging(output: &OutputConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(output.log_directive()));
    // a second initialization (e.g. from tests) is not an error worth reporting
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(output.verbose > 1)
        .try_init();
}

fn build_runtime(runtime: &RuntimeConfig) -> anyhow::Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    Ok(builder.build()?)
}

/// Run an async entry point inside a freshly built runtime
///
/// Returns `Some(summary)` on success. On failure the error chain is printed to stderr
/// (unless `quiet`) and `None` is returned; the caller decides the exit code.
pub fn run<Fut, Summary>(
    output: OutputConfig,
    runtime: RuntimeConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Summary>
where
    Summary: std::fmt::Display,
    Fut: std::future::Future<Output = anyhow::Result<Summary>>,
{
    init_logging(&output);
    let runtime = match build_runtime(&runtime) {
        Ok(runtime) => runtime,
        Err(error) => {
            if !output.quiet {
                eprintln!("failed to start the async runtime: {error:#}");
            }
            return None;
        }
    };
    let res = runtime.block_on(func());
    match res {
        Ok(summary) => {
            if output.print_summary && !output.quiet {
                eprintln!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            tracing::debug!("operation failed: {:?}", &error);
            if !output.quiet {
                eprintln!("{error:#}");
            }
            None
        }
    }
}
