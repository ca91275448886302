use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use cmdlink_client::{send_with_retry, HostLauncher, RetryPolicy};
use cmdlink_proto::{CommandRequest, PayloadFormat};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{client_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{print_response, OutputFormat};

pub async fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let policy = RetryPolicy {
        attempts: args.attempts,
        attempts_after_launch: args.launch_attempts,
        delay: parse_duration(&args.retry_delay)?,
        connect_timeout: parse_duration(&args.connect_timeout)?,
        ack_timeout: parse_duration(&args.ack_timeout)?,
    };

    let request = build_request(&args)?;
    let launcher = args
        .launch
        .as_deref()
        .map(|cmdline| SpawnLauncher::new(cmdline, &args.channel));

    // Ctrl-C abandons the attempt loop and any in-flight wait.
    let cancel = CancellationToken::new();
    let signalled = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signalled.cancel();
        }
    });

    let response = send_with_retry(
        &args.channel,
        &request,
        &policy,
        launcher.as_ref().map(|l| l as &dyn HostLauncher),
        &cancel,
    )
    .await
    .map_err(|err| client_error("send failed", err))?;

    print_response(&response, format);
    Ok(if response.success { SUCCESS } else { FAILURE })
}

fn build_request(args: &SendArgs) -> CliResult<CommandRequest> {
    let cwd = match &args.cwd {
        Some(dir) => dir.display().to_string(),
        None => std::env::current_dir()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default(),
    };

    let mut request = CommandRequest::new(&args.command, resolve_payload(args)?).with_cwd(cwd);
    if args.text {
        request = request.with_format(PayloadFormat::Text);
    }
    Ok(request)
}

fn resolve_payload(args: &SendArgs) -> CliResult<String> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.clone());
    }
    if let Some(data) = &args.data {
        return Ok(data.clone());
    }
    if let Some(path) = &args.file {
        return std::fs::read_to_string(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(String::new())
}

/// Starts the host from a shell command line when it is not running.
///
/// Liveness is inferred from the channel's socket file. A stale file
/// over-reports a running host; the launch is then skipped and the retry
/// loop exhausts its base ceiling instead.
struct SpawnLauncher {
    command_line: String,
    socket_path: Option<PathBuf>,
}

impl SpawnLauncher {
    fn new(command_line: &str, channel: &str) -> Self {
        Self {
            command_line: command_line.to_string(),
            socket_path: cmdlink_proto::socket_path(channel).ok(),
        }
    }
}

impl HostLauncher for SpawnLauncher {
    fn is_running(&self) -> bool {
        self.socket_path.as_deref().is_some_and(Path::exists)
    }

    fn launch(&self) -> std::io::Result<()> {
        debug!(command_line = %self.command_line, "spawning host");
        std::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
    }
}
