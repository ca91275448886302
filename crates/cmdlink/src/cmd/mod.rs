use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one command to a host and print its response.
    Send(SendArgs),
    /// Run a demo host serving a channel.
    Serve(ServeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format).await,
        Command::Serve(args) => serve::run(args).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Channel id of the target host.
    pub channel: String,
    /// Command name to invoke.
    pub command: String,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// JSON payload (validated locally before sending).
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Ask the handler for a text rendering of the response data.
    #[arg(long)]
    pub text: bool,
    /// Working directory to report to the host. Defaults to the process cwd.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,
    /// Per-attempt bound on request write plus acknowledgement
    /// (e.g. 5s, 500ms; 0 waits indefinitely).
    #[arg(long, default_value = "5s")]
    pub ack_timeout: String,
    /// Per-attempt bound on connect plus handshake (0 waits indefinitely).
    #[arg(long, default_value = "2s")]
    pub connect_timeout: String,
    /// Attempt ceiling when the host is already running.
    #[arg(long, default_value_t = 10)]
    pub attempts: u32,
    /// Shell command line that starts the host when it is not running.
    #[arg(long, value_name = "CMDLINE")]
    pub launch: Option<String>,
    /// Raised attempt ceiling applied after launching the host.
    #[arg(long, default_value_t = 40)]
    pub launch_attempts: u32,
    /// Fixed delay between attempts.
    #[arg(long, default_value = "250ms")]
    pub retry_delay: String,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Channel id to serve on.
    pub channel: String,
    /// Host tick interval driving command execution.
    #[arg(long, default_value = "10ms")]
    pub tick: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s` / `500ms` style duration flags. A bare number means
/// seconds; `0` is allowed (the timeout flags treat it as "no bound").
pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}
