//! Unix socket binding with stale-socket recovery.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tokio::net::UnixListener;
use tracing::info;

/// Bind a listener at `path` with user-only permissions.
///
/// A leftover socket file from a crashed daemon is unlinked and replaced —
/// but only after probing it by connecting: a socket a live process still
/// answers on is never stolen.
///
/// # Errors
///
/// Returns [`io::ErrorKind::AddrInUse`] when a live daemon holds the
/// socket, and any underlying I/O error from unlink, bind, or permission
/// setup.
pub fn bind_socket(path: &Path) -> io::Result<UnixListener> {
    if path.exists() {
        match std::os::unix::net::UnixStream::connect(path) {
            Ok(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!("socket {} is held by a running daemon", path.display()),
                ));
            },
            Err(_) => {
                info!(path = %path.display(), "removing stale socket file");
                std::fs::remove_file(path)?;
            },
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(listener)
}
