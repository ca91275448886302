//! Accept loop and lifecycle for a host-side command channel.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use cmdlink_proto::socket_path;

use crate::bridge::CommandCallback;
use crate::connection::{self, ConnContext};
use crate::error::{Result, ServerError};
use crate::socket::ChannelSocket;

/// Pause after a failed accept before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How long a fresh connection may take to complete its handshake
    /// before being dropped.
    pub handshake_timeout: Duration,
    /// How long graceful shutdown waits for in-flight connections.
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

/// Host-side endpoint of a command channel.
///
/// Binding is eager: once `bind` returns, the socket file exists and
/// clients can connect. Decoded requests are surfaced through the
/// supplied callback; the server itself never executes handler code.
pub struct CommandServer {
    socket: ChannelSocket,
    callback: CommandCallback,
    config: ServerConfig,
    shutdown: CancellationToken,
}

impl CommandServer {
    /// Bind the channel's socket with default configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(channel: &str, callback: CommandCallback) -> Result<Self> {
        Self::bind_with_config(channel, callback, ServerConfig::default())
    }

    pub fn bind_with_config(
        channel: &str,
        callback: CommandCallback,
        config: ServerConfig,
    ) -> Result<Self> {
        let path = socket_path(channel).map_err(ServerError::Channel)?;
        Self::bind_at(path, callback, config)
    }

    /// Bind at an explicit socket path, bypassing channel resolution.
    pub fn bind_at(
        path: impl Into<PathBuf>,
        callback: CommandCallback,
        config: ServerConfig,
    ) -> Result<Self> {
        let socket = ChannelSocket::bind(path.into())?;
        Ok(Self {
            socket,
            callback,
            config,
            shutdown: CancellationToken::new(),
        })
    }

    /// Path of the bound socket file.
    pub fn local_path(&self) -> &Path {
        self.socket.path()
    }

    /// Token that stops the server when cancelled. Clone it out before
    /// handing `self` to [`run`](Self::run).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serve connections until the shutdown token fires.
    ///
    /// Accept errors are logged and retried; nothing that happens on an
    /// individual connection can end the loop. On shutdown, in-flight
    /// connections get `shutdown_grace` to finish, then the socket file
    /// is removed.
    pub async fn run(self) {
        let tracker = TaskTracker::new();
        info!(path = %self.socket.path().display(), "command server listening");

        let mut next_conn_id: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                accepted = self.socket.accept() => match accepted {
                    Ok(stream) => {
                        let ctx = ConnContext {
                            conn_id: next_conn_id,
                            callback: self.callback.clone(),
                            handshake_timeout: self.config.handshake_timeout,
                            shutdown: self.shutdown.child_token(),
                        };
                        next_conn_id += 1;
                        tracker.spawn(connection::serve(stream, ctx));
                    }
                    Err(err) => {
                        warn!(%err, "accept failed; retrying");
                        tokio::select! {
                            biased;
                            _ = self.shutdown.cancelled() => break,
                            _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => {}
                        }
                    }
                }
            }
        }

        tracker.close();
        if tokio::time::timeout(self.config.shutdown_grace, tracker.wait())
            .await
            .is_err()
        {
            warn!("shutdown grace expired with connections still open");
        }
        info!(path = %self.socket.path().display(), "command server stopped");
    }
}

impl std::fmt::Debug for CommandServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandServer")
            .field("path", &self.socket.path())
            .field("config", &self.config)
            .finish()
    }
}
