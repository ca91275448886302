use std::fmt;
use std::io;

use cmdlink_client::ClientError;
use cmdlink_proto::WireError;
use cmdlink_server::ServerError;

// Exit code constants, sysexits-flavoured.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;
pub const INTERRUPTED: i32 = 130;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

fn wire_code(err: &WireError) -> i32 {
    match err {
        WireError::InvalidMagic { .. } | WireError::InvalidLength { .. } => TRANSPORT_ERROR,
        WireError::Json(_) => DATA_INVALID,
        WireError::InvalidChannel(..) | WireError::PathTooLong { .. } => USAGE,
        WireError::ConnectionClosed { .. } => FAILURE,
        WireError::Io(_) | WireError::Unsupported => INTERNAL,
    }
}

pub fn client_error(context: &str, err: ClientError) -> CliError {
    let code = match &err {
        ClientError::Channel(wire) => wire_code(wire),
        ClientError::Connect { source, .. } | ClientError::Launch { source } => {
            return io_error(context, std::io::Error::new(source.kind(), err.to_string()));
        }
        ClientError::ConnectTimeout { .. } | ClientError::AckTimeout { .. } => TIMEOUT,
        ClientError::HandshakeFailed { .. } | ClientError::UnexpectedAck { .. } => TRANSPORT_ERROR,
        ClientError::ClosedBeforeAck { .. } => FAILURE,
        ClientError::Transport { source, .. }
        | ClientError::Send { source, .. }
        | ClientError::Response { source, .. } => wire_code(source),
        ClientError::Cancelled { .. } => INTERRUPTED,
        ClientError::AlreadyConnected { .. } | ClientError::NotConnected => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn server_error(context: &str, err: ServerError) -> CliError {
    let code = match &err {
        ServerError::Channel(wire) => wire_code(wire),
        ServerError::Dir { source, .. } | ServerError::Bind { source, .. } => {
            return io_error(context, std::io::Error::new(source.kind(), err.to_string()));
        }
    };
    CliError::new(code, format!("{context}: {err}"))
}
