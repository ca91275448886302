//! Transport client: one connection, handshake first, then any number of
//! sequential request/response exchanges.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use cmdlink_proto::{
    decode_response, encode_request, read_handshake, read_message, write_handshake, write_message,
    CommandRequest, CommandResponse, WireError, ACK, PROTOCOL_VERSION,
};

use crate::error::{ClientError, Result};

#[cfg(unix)]
use tokio::net::UnixStream;

/// What the single ACK read produced.
enum AckOutcome {
    Acked,
    Closed,
    Unexpected(u8),
}

/// Client side of a command channel.
///
/// One instance supports exactly one connection: a second
/// [`connect`](CommandClient::connect) fails with `AlreadyConnected`
/// instead of silently reconnecting. Callers wanting a retry discard the
/// instance and build a fresh one (the orchestrator in [`crate::retry`]
/// does exactly that).
pub struct CommandClient {
    channel: String,
    path: PathBuf,
    #[cfg(unix)]
    stream: Option<UnixStream>,
    /// Latched by the first successful connect; never cleared.
    used: bool,
}

impl CommandClient {
    /// Build a client for a channel, deriving the socket path from the
    /// default runtime directory.
    pub fn new(channel: impl Into<String>) -> Result<Self> {
        let channel = channel.into();
        let path = cmdlink_proto::socket_path(&channel).map_err(ClientError::Channel)?;
        Ok(Self::with_path(channel, path))
    }

    /// Build a client against an explicit socket path.
    pub fn with_path(channel: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            channel: channel.into(),
            path: path.into(),
            #[cfg(unix)]
            stream: None,
            used: false,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(unix)]
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    #[cfg(not(unix))]
    pub fn is_connected(&self) -> bool {
        false
    }

    /// Open the stream and perform the handshake.
    ///
    /// `timeout` bounds connect plus handshake together; `Duration::ZERO`
    /// means wait indefinitely. On any handshake failure the stream is
    /// closed before this returns.
    #[cfg(unix)]
    pub async fn connect(&mut self, timeout: Duration) -> Result<()> {
        if self.used {
            return Err(ClientError::AlreadyConnected {
                channel: self.channel.clone(),
            });
        }

        let attempt = Self::open_and_shake(&self.path, &self.channel);
        let stream = if timeout.is_zero() {
            attempt.await?
        } else {
            tokio::time::timeout(timeout, attempt)
                .await
                .map_err(|_| ClientError::ConnectTimeout {
                    path: self.path.clone(),
                    timeout,
                })??
        };

        debug!(channel = %self.channel, path = %self.path.display(), "connected");
        self.stream = Some(stream);
        self.used = true;
        Ok(())
    }

    #[cfg(not(unix))]
    pub async fn connect(&mut self, _timeout: Duration) -> Result<()> {
        Err(ClientError::Channel(WireError::Unsupported))
    }

    #[cfg(unix)]
    async fn open_and_shake(path: &Path, channel: &str) -> Result<UnixStream> {
        let mut stream =
            UnixStream::connect(path)
                .await
                .map_err(|source| ClientError::Connect {
                    path: path.to_path_buf(),
                    source,
                })?;

        write_handshake(&mut stream)
            .await
            .map_err(|source| transport_fault(channel, source))?;

        let version = match read_handshake(&mut stream).await {
            Ok(version) => version,
            Err(WireError::InvalidMagic { got, .. }) => {
                return Err(ClientError::HandshakeFailed {
                    channel: channel.to_string(),
                    reason: format!("server replied with foreign magic bytes {got:02x?}"),
                });
            }
            Err(source) => return Err(transport_fault(channel, source)),
        };

        if version != PROTOCOL_VERSION {
            return Err(ClientError::HandshakeFailed {
                channel: channel.to_string(),
                reason: format!(
                    "protocol version mismatch: ours {PROTOCOL_VERSION}, server {version}"
                ),
            });
        }

        Ok(stream)
    }

    /// Send one command and await its response.
    ///
    /// Two phases with different clocks:
    /// - Phase 1 (bounded by `timeout` unless zero): write the framed
    ///   request, flush, await the single ACK byte. This protects against
    ///   a server that never starts working.
    /// - Phase 2 (unbounded, responsive only to `cancel`): await the
    ///   length-prefixed response. A legitimately slow handler must not be
    ///   mistaken for a dead connection once the work was acknowledged.
    ///
    /// On success the connection stays usable for further sends; on any
    /// error it is dropped (the stream may be desynced).
    #[cfg(unix)]
    pub async fn send_command(
        &mut self,
        request: &CommandRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CommandResponse> {
        let result = self.send_command_inner(request, timeout, cancel).await;
        if result.is_err() {
            self.stream = None;
        }
        result
    }

    #[cfg(not(unix))]
    pub async fn send_command(
        &mut self,
        _request: &CommandRequest,
        _timeout: Duration,
        _cancel: &CancellationToken,
    ) -> Result<CommandResponse> {
        Err(ClientError::NotConnected)
    }

    #[cfg(unix)]
    async fn send_command_inner(
        &mut self,
        request: &CommandRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CommandResponse> {
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
        let command = request.command.as_str();
        let channel = self.channel.as_str();

        let payload = encode_request(request).map_err(|source| ClientError::Send {
            command: command.to_string(),
            channel: channel.to_string(),
            source,
        })?;

        // Phase 1: request out, ACK back, on the caller's clock.
        let ack = send_and_await_ack(stream, &payload);
        let outcome = if timeout.is_zero() {
            ack.await
        } else {
            match tokio::time::timeout(timeout, ack).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(ClientError::AckTimeout {
                        timeout,
                        command: command.to_string(),
                        channel: channel.to_string(),
                    })
                }
            }
        };

        match outcome.map_err(|source| ClientError::Send {
            command: command.to_string(),
            channel: channel.to_string(),
            source,
        })? {
            AckOutcome::Acked => {}
            AckOutcome::Closed => {
                return Err(ClientError::ClosedBeforeAck {
                    command: command.to_string(),
                    channel: channel.to_string(),
                })
            }
            AckOutcome::Unexpected(byte) => {
                return Err(ClientError::UnexpectedAck {
                    byte,
                    command: command.to_string(),
                    channel: channel.to_string(),
                })
            }
        }
        debug!(channel, command, "request acknowledged");

        // Phase 2: the response, on the handler's clock.
        tokio::select! {
            biased;
            outcome = read_response(stream) => {
                outcome.map_err(|source| ClientError::Response {
                    command: command.to_string(),
                    channel: channel.to_string(),
                    source,
                })
            }
            _ = cancel.cancelled() => Err(ClientError::Cancelled {
                command: command.to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for CommandClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandClient")
            .field("channel", &self.channel)
            .field("path", &self.path)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(unix)]
async fn send_and_await_ack(
    stream: &mut UnixStream,
    payload: &[u8],
) -> std::result::Result<AckOutcome, WireError> {
    write_message(stream, payload).await?;

    let mut ack = [0u8; 1];
    let n = stream.read(&mut ack).await?;
    if n == 0 {
        return Ok(AckOutcome::Closed);
    }
    if ack[0] != ACK {
        return Ok(AckOutcome::Unexpected(ack[0]));
    }
    Ok(AckOutcome::Acked)
}

#[cfg(unix)]
async fn read_response(stream: &mut UnixStream) -> std::result::Result<CommandResponse, WireError> {
    let payload = read_message(stream).await?;
    decode_response(&payload)
}

fn transport_fault(channel: &str, source: WireError) -> ClientError {
    ClientError::Transport {
        channel: channel.to_string(),
        source,
    }
}
