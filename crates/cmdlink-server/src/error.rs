use std::path::PathBuf;

use cmdlink_proto::WireError;

/// Errors raised while setting a server up. Runtime connection faults are
/// handled (logged, connection closed) rather than surfaced: they must
/// never take the accept loop down.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Channel id could not be mapped to a socket path.
    #[error(transparent)]
    Channel(WireError),

    /// The socket's parent directory could not be prepared.
    #[error("failed to prepare socket directory {path}: {source}")]
    Dir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Binding the listener failed.
    #[error("failed to bind {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ServerError>;
