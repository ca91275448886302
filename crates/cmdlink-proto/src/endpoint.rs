//! Channel addressing.
//!
//! A channel is an opaque string identifier supplied by the host (derived
//! from its own identity, out of scope here). Each channel maps to exactly
//! one Unix socket path under the runtime directory.

use std::path::{Path, PathBuf};

use crate::error::{Result, WireError};

/// Directory name for channel sockets under the runtime dir.
pub const RUNTIME_DIR_NAME: &str = "cmdlink";

/// Channel identifiers are kept short so derived paths stay well inside
/// the `sun_path` limit.
pub const MAX_CHANNEL_LEN: usize = 64;

#[cfg(target_os = "macos")]
const MAX_SOCKET_PATH: usize = 104;
#[cfg(all(unix, not(target_os = "macos")))]
const MAX_SOCKET_PATH: usize = 108;

/// Validate a channel identifier before any filesystem work.
///
/// Allowed: 1..=64 bytes of `[A-Za-z0-9._-]`, not consisting solely of
/// dots. Everything else is rejected so a channel id can never traverse
/// or escape the socket directory.
pub fn validate_channel(channel: &str) -> Result<()> {
    if channel.is_empty() {
        return Err(WireError::InvalidChannel(
            channel.to_string(),
            "must not be empty",
        ));
    }
    if channel.len() > MAX_CHANNEL_LEN {
        return Err(WireError::InvalidChannel(
            channel.to_string(),
            "longer than 64 bytes",
        ));
    }
    if !channel
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
    {
        return Err(WireError::InvalidChannel(
            channel.to_string(),
            "contains characters outside [A-Za-z0-9._-]",
        ));
    }
    if channel.bytes().all(|b| b == b'.') {
        return Err(WireError::InvalidChannel(
            channel.to_string(),
            "must not consist solely of dots",
        ));
    }
    Ok(())
}

/// The directory channel sockets live in.
///
/// `$XDG_RUNTIME_DIR/cmdlink` when the variable is set, else
/// `/tmp/cmdlink`.
pub fn socket_dir() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR").map_or_else(
        || PathBuf::from("/tmp").join(RUNTIME_DIR_NAME),
        |runtime| PathBuf::from(runtime).join(RUNTIME_DIR_NAME),
    )
}

/// Map a channel id to its socket path under the default runtime dir.
pub fn socket_path(channel: &str) -> Result<PathBuf> {
    socket_path_in(&socket_dir(), channel)
}

/// Map a channel id to its socket path under an explicit directory.
pub fn socket_path_in(dir: &Path, channel: &str) -> Result<PathBuf> {
    validate_channel(channel)?;
    let path = dir.join(format!("{channel}.sock"));
    check_path_len(&path)?;
    Ok(path)
}

#[cfg(unix)]
fn check_path_len(path: &Path) -> Result<()> {
    use std::os::unix::ffi::OsStrExt;

    let len = path.as_os_str().as_bytes().len();
    // sun_path must hold the path plus a NUL terminator.
    if len >= MAX_SOCKET_PATH {
        return Err(WireError::PathTooLong {
            path: path.display().to_string(),
            len,
            max: MAX_SOCKET_PATH - 1,
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_path_len(_path: &Path) -> Result<()> {
    Err(WireError::Unsupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_channels() {
        for channel in ["editor-4f2a", "my.host_1", "A", "a-b.c_d-0"] {
            validate_channel(channel).unwrap();
        }
    }

    #[test]
    fn rejects_empty_channel() {
        assert!(matches!(
            validate_channel(""),
            Err(WireError::InvalidChannel(..))
        ));
    }

    #[test]
    fn rejects_path_traversal() {
        for channel in ["..", ".", "a/b", "../up", "a\\b", "has space"] {
            assert!(
                validate_channel(channel).is_err(),
                "{channel:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_overlong_channel() {
        let channel = "c".repeat(MAX_CHANNEL_LEN + 1);
        assert!(validate_channel(&channel).is_err());
    }

    #[test]
    fn derives_path_in_explicit_dir() {
        let path = socket_path_in(Path::new("/run/user/1000/cmdlink"), "editor-1").unwrap();
        assert_eq!(
            path,
            PathBuf::from("/run/user/1000/cmdlink/editor-1.sock")
        );
    }

    #[cfg(unix)]
    #[test]
    fn rejects_overlong_socket_path() {
        let deep = format!("/tmp/{}", "d".repeat(90));
        let err = socket_path_in(Path::new(&deep), "chan-chan-chan").unwrap_err();
        assert!(matches!(err, WireError::PathTooLong { .. }));
    }

    #[test]
    fn default_dir_falls_back_to_tmp() {
        // Can't assert the XDG branch without mutating process env; the
        // fallback shape is stable either way.
        let dir = socket_dir();
        assert!(dir.ends_with(RUNTIME_DIR_NAME));
    }
}
