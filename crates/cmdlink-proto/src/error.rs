/// Errors raised while encoding, decoding, or transporting wire structures.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The handshake did not start with the protocol magic bytes.
    #[error("invalid protocol magic {got:02x?} (expected {expected:02x?} \"CLNK\")")]
    InvalidMagic { got: [u8; 4], expected: [u8; 4] },

    /// A message length header declared a size outside `1..=MAX_MESSAGE_SIZE`.
    ///
    /// `declared` is the header interpreted as a little-endian `i32`; `raw`
    /// preserves the exact header bytes for desync diagnosis.
    #[error("invalid message length {declared} (raw header bytes {raw:02x?}, max {max})")]
    InvalidLength {
        declared: i64,
        raw: [u8; 4],
        max: usize,
    },

    /// A channel identifier that cannot be mapped to a socket path.
    #[error("invalid channel id {0:?}: {1}")]
    InvalidChannel(String, &'static str),

    /// The derived socket path exceeds the platform's `sun_path` limit.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: String,
        len: usize,
        max: usize,
    },

    /// The peer closed the connection before a complete structure arrived.
    ///
    /// `clean` is true when the close fell on a message boundary (no header
    /// byte of the next message had been read yet).
    #[error("connection closed")]
    ConnectionClosed { clean: bool },

    /// An I/O error occurred while reading or writing wire structures.
    #[error("wire I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A request or response payload was not the expected JSON shape.
    #[error("malformed message payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The current platform has no local-socket transport.
    #[error("local sockets are not supported on this platform")]
    Unsupported,
}

impl WireError {
    /// Whether this error means the peer went away (as opposed to a
    /// protocol or encoding problem on an otherwise live connection).
    pub fn is_disconnect(&self) -> bool {
        match self {
            WireError::ConnectionClosed { .. } => true,
            WireError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, WireError>;
