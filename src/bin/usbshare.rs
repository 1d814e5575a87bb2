//! usbshare guest client - attach and detach remote USB devices
//!
//! # Usage
//!
//! ```text
//! usbshare list
//! usbshare connect --remote <HOST/IP> --busid <BUSID>
//! usbshare disconnect --busid <BUSID>
//! usbshare help
//! ```
//!
//! Exit status: 0 on success, 1 when the backend reports a failure,
//! 2 on usage errors.

use std::io;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use usbshare_core::paths;
use usbshare_guest::{run_command, ExitStatus, GuestCommand};
use usbshare_usbipd::{UsbipdBackend, DEFAULT_TOOL};

/// usbshare guest client
#[derive(Parser, Debug)]
#[command(name = "usbshare", version, about)]
struct Args {
    /// usbipd executable
    #[arg(long, global = true, env = paths::TOOL_ENV, default_value = DEFAULT_TOOL)]
    tool: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List local USB devices
    List,
    /// Attach a device shared by a remote host
    Connect {
        /// Host sharing the device
        #[arg(short = 'r', long)]
        remote: String,

        /// Bus id of the device on the host
        #[arg(short = 'b', long)]
        busid: String,
    },
    /// Detach a device
    Disconnect {
        #[arg(short = 'b', long)]
        busid: String,
    },
}

impl From<Command> for GuestCommand {
    fn from(command: Command) -> Self {
        match command {
            Command::List => Self::List,
            Command::Connect { remote, busid } => Self::Connect { remote, busid },
            Command::Disconnect { busid } => Self::Disconnect { busid },
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Usage errors exit with status 2, help and version with 0
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off")))
        .with_writer(io::stderr)
        .init();

    let backend = UsbipdBackend::new(args.tool);
    let status = run_command(
        &backend,
        args.command.into(),
        &mut io::stdout().lock(),
        &mut io::stderr().lock(),
    )
    .await;

    match status {
        Ok(status) => ExitCode::from(status.code()),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(ExitStatus::Failure.code())
        }
    }
}
