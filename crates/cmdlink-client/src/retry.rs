//! Connect-and-send orchestration: bounded retries with a fixed delay,
//! optionally launching the host application on a cold start.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use cmdlink_proto::{CommandRequest, CommandResponse};

use crate::client::CommandClient;
use crate::error::{ClientError, Result};

/// Collaborator that can detect and start the host application.
pub trait HostLauncher: Send + Sync {
    /// Whether the host appears to be running already.
    fn is_running(&self) -> bool;

    /// Start the host. Returns once the process is spawned; readiness is
    /// observed by the retry loop connecting, not by this call.
    fn launch(&self) -> std::io::Result<()>;
}

/// Retry policy for [`send_with_retry`]. The inter-attempt delay is
/// fixed, with no jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempt ceiling when the host is (believed) running.
    pub attempts: u32,
    /// Raised ceiling applied after launching the host, covering
    /// cold-start latency.
    pub attempts_after_launch: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// Per-attempt bound on connect plus handshake.
    pub connect_timeout: Duration,
    /// Per-attempt bound on phase 1 of the send (request write + ACK).
    pub ack_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            attempts_after_launch: 40,
            delay: Duration::from_millis(250),
            connect_timeout: Duration::from_secs(2),
            ack_timeout: Duration::from_secs(5),
        }
    }
}

/// Connect and send one command, retrying the whole cycle on retryable
/// failures.
///
/// Every attempt uses a fresh [`CommandClient`]; connections are never
/// reused across attempts. On the first connect failure, if a launcher is
/// supplied and reports the host as not running, the host is launched
/// (at most once per call) and the attempt ceiling is raised to
/// `attempts_after_launch`. Non-retryable errors return immediately;
/// when all attempts are exhausted the last error is returned verbatim.
pub async fn send_with_retry(
    channel: &str,
    request: &CommandRequest,
    policy: &RetryPolicy,
    launcher: Option<&dyn HostLauncher>,
    cancel: &CancellationToken,
) -> Result<CommandResponse> {
    let mut ceiling = policy.attempts.max(1);
    let mut launched = false;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let mut client = CommandClient::new(channel)?;

        let err = match client.connect(policy.connect_timeout).await {
            Ok(()) => {
                match client
                    .send_command(request, policy.ack_timeout, cancel)
                    .await
                {
                    Ok(response) => return Ok(response),
                    Err(err) if err.is_retryable() => err,
                    Err(err) => return Err(err),
                }
            }
            Err(err) if err.is_retryable() => {
                if !launched {
                    if let Some(launcher) = launcher {
                        if !launcher.is_running() {
                            info!(channel, "host not running, launching");
                            launcher
                                .launch()
                                .map_err(|source| ClientError::Launch { source })?;
                            launched = true;
                            ceiling = ceiling.max(policy.attempts_after_launch);
                        }
                    }
                }
                err
            }
            Err(err) => return Err(err),
        };

        if attempt >= ceiling {
            return Err(err);
        }
        debug!(
            channel,
            attempt,
            ceiling,
            error = %err,
            "attempt failed, retrying after fixed delay"
        );
        tokio::select! {
            _ = tokio::time::sleep(policy.delay) => {}
            _ = cancel.cancelled() => {
                return Err(ClientError::Cancelled {
                    command: request.command.clone(),
                });
            }
        }
    }
}
