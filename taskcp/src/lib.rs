//! Copy a single file into or out of a running ECS container
//!
//! `taskcp` only relies on two capabilities of the container: the interactive command
//! channel (`aws ecs execute-command`) and an SSM port tunnel. Neither moves bulk data on
//! its own, so every copy:
//!
//! 1. ships a small static agent (`taskcp-agent`) inside the bootstrap command, base64
//!    encoded, and starts it with its standard streams redirected to or from the remote
//!    file
//! 2. opens a port tunnel to the same port at the same time
//! 3. waits for the agent to announce that it listens
//! 4. dials the local end of the tunnel (retrying until the tunnel lets it through) and
//!    streams the file over plain TCP
//! 5. tears down the agent first, then the tunnel
//!
//! # Usage
//!
//! ```bash
//! # upload into a directory of the only task of a service
//! taskcp --cluster prod --service web README.md _:/tmp/
//!
//! # download from an explicit task to stdout
//! taskcp --cluster prod 0123456789abcdef:/var/log/app.log - | less
//! ```
//!
//! `TOKEN:path` marks the remote side. `TOKEN` is a task id, or `_` for the task picked by
//! `--id`, `--family` and `--service`. A destination ending with `/` receives the source
//! basename. Exactly one side must be remote.
//!
//! # Library layout
//!
//! - [`path`] parses endpoints into a [`path::CopyRequest`]
//! - [`task`] holds the resolved [`task::TransferTask`]
//! - [`session`], [`launcher`] and [`tunnel`] run the two background operations
//! - [`controller`] sequences readiness, transfer and teardown

pub mod controller;
pub mod error;
pub mod launcher;
pub mod path;
pub mod session;
pub mod task;
pub mod tunnel;

pub use controller::{CopyReport, OperationEnd, TransferSummary, run_copy};
pub use error::CopyError;
pub use task::{DEFAULT_PORT, TransferTask};
