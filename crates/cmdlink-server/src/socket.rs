//! Channel socket lifecycle: bind with stale-socket cleanup, hardened
//! permissions, and identity-checked removal on drop.

use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info};

use crate::error::{Result, ServerError};

/// A bound listener for one channel.
///
/// The socket file is created mode 0600 inside a 0700 directory; a stale
/// socket left by a dead host is removed before binding, but an existing
/// non-socket path is refused. On drop the file is removed only if it is
/// still the same inode this listener created, so a replacement socket
/// bound by a newer process survives.
pub struct ChannelSocket {
    listener: UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

impl ChannelSocket {
    /// Permission mode for created socket files.
    pub const SOCKET_MODE: u32 = 0o600;
    /// Permission mode for created socket directories.
    pub const DIR_MODE: u32 = 0o700;

    /// Bind a listener at `path`, preparing the parent directory.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }

        // Remove a stale socket, but never a non-socket path.
        if path.exists() {
            let metadata =
                std::fs::symlink_metadata(&path).map_err(|source| ServerError::Bind {
                    path: path.clone(),
                    source,
                })?;
            if metadata.file_type().is_socket() {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(|source| ServerError::Bind {
                    path: path.clone(),
                    source,
                })?;
            } else {
                return Err(ServerError::Bind {
                    path: path.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                });
            }
        }

        let listener = UnixListener::bind(&path).map_err(|source| ServerError::Bind {
            path: path.clone(),
            source,
        })?;

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(Self::SOCKET_MODE))
            .map_err(|source| ServerError::Bind {
                path: path.clone(),
                source,
            })?;

        let created = std::fs::symlink_metadata(&path).map_err(|source| ServerError::Bind {
            path: path.clone(),
            source,
        })?;
        let created_inode = Some((created.dev(), created.ino()));

        info!(?path, "listening on channel socket");

        Ok(Self {
            listener,
            path,
            created_inode,
        })
    }

    /// Accept one incoming connection.
    pub async fn accept(&self) -> std::io::Result<UnixStream> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(stream)
    }

    /// The path this listener is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ChannelSocket {
    fn drop(&mut self) {
        if let Some((expected_dev, expected_ino)) = self.created_inode {
            if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
                if metadata.file_type().is_socket()
                    && metadata.dev() == expected_dev
                    && metadata.ino() == expected_ino
                {
                    debug!(path = ?self.path, "cleaning up socket file");
                    let _ = std::fs::remove_file(&self.path);
                } else {
                    debug!(
                        path = ?self.path,
                        "socket path identity changed; skipping cleanup"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for ChannelSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSocket")
            .field("path", &self.path)
            .finish()
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|source| ServerError::Dir {
        path: dir.to_path_buf(),
        source,
    })?;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(ChannelSocket::DIR_MODE))
        .map_err(|source| ServerError::Dir {
            path: dir.to_path_buf(),
            source,
        })?;
    Ok(())
}
