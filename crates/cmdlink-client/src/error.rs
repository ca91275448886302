use std::path::PathBuf;
use std::time::Duration;

use cmdlink_proto::WireError;

/// Errors surfaced by the transport client and the retry orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Channel id could not be mapped to a socket path.
    #[error(transparent)]
    Channel(WireError),

    /// The underlying connect call failed.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Connect plus handshake exceeded the caller's timeout.
    #[error("connect to {path} timed out after {timeout:?}")]
    ConnectTimeout { path: PathBuf, timeout: Duration },

    /// The client has already used its single connection.
    #[error("client already connected on channel '{channel}' (one connection per client)")]
    AlreadyConnected { channel: String },

    /// No connection has been established yet.
    #[error("client is not connected")]
    NotConnected,

    /// The peer is not speaking this protocol (magic or version mismatch).
    #[error("handshake failed on channel '{channel}': {reason}")]
    HandshakeFailed { channel: String, reason: String },

    /// Transport fault during connect/handshake, before any command.
    #[error("connection fault on channel '{channel}': {source}")]
    Transport {
        channel: String,
        #[source]
        source: WireError,
    },

    /// The server closed the stream after the request was written but
    /// before acknowledging it: the command never reached processing.
    #[error("server closed the connection before acknowledging command '{command}' on channel '{channel}'")]
    ClosedBeforeAck { command: String, channel: String },

    /// The server sent something other than the ACK byte.
    #[error("unexpected acknowledgement byte {byte:#04x} for command '{command}' on channel '{channel}'")]
    UnexpectedAck {
        byte: u8,
        command: String,
        channel: String,
    },

    /// The server did not acknowledge the request within the caller's
    /// timeout (it may be wedged before even starting the work).
    #[error("timed out after {timeout:?} waiting for acknowledgement of command '{command}' on channel '{channel}'")]
    AckTimeout {
        timeout: Duration,
        command: String,
        channel: String,
    },

    /// Fault while writing the request or awaiting the ACK.
    #[error("failed sending command '{command}' on channel '{channel}': {source}")]
    Send {
        command: String,
        channel: String,
        #[source]
        source: WireError,
    },

    /// Fault while reading or decoding the response.
    #[error("failed reading response for command '{command}' on channel '{channel}': {source}")]
    Response {
        command: String,
        channel: String,
        #[source]
        source: WireError,
    },

    /// The caller's cancellation token fired while awaiting the response.
    #[error("command '{command}' cancelled while awaiting response")]
    Cancelled { command: String },

    /// The host launcher failed to start the host process.
    #[error("failed to launch host application: {source}")]
    Launch {
        #[source]
        source: std::io::Error,
    },
}

impl ClientError {
    /// Whether the orchestrator may retry the whole connect+send cycle
    /// with a fresh client.
    ///
    /// Retryable: the peer was absent or went away (connect refused or
    /// not-found, closed before ACK, disconnect-class I/O during
    /// send/response). Everything else signals a protocol or semantic
    /// problem that another attempt cannot fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Connect { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
            ),
            ClientError::ClosedBeforeAck { .. } => true,
            ClientError::Transport { source, .. }
            | ClientError::Send { source, .. }
            | ClientError::Response { source, .. } => source.is_disconnect(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
