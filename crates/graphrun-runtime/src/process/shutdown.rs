//! OS-level termination of an owned server process.
//!
//! Only reached when the graceful RPC kill failed or left the child running.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tokio::time::timeout;

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Grace period between SIGTERM and SIGKILL.
pub const TERM_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Terminate a child with SIGTERM, escalating to SIGKILL after `grace`.
///
/// # Platform behavior
/// - Unix: SIGTERM via `nix`, then SIGKILL via `Child::kill`
/// - Other: `Child::kill` immediately
///
/// The child is always reaped before returning `Ok`.
pub async fn terminate_child(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let pid = Pid::from_raw(i32::try_from(pid).map_err(io::Error::other)?);
            match signal::kill(pid, Signal::SIGTERM) {
                Ok(()) => {
                    if let Ok(result) = timeout(grace, child.wait()).await {
                        return result;
                    }
                }
                // Already gone between try_wait and kill
                Err(nix::errno::Errno::ESRCH) => return child.wait().await,
                Err(e) => return Err(io::Error::other(e)),
            }
        }
    }

    #[cfg(not(unix))]
    let _ = grace;

    child.kill().await?;
    child.wait().await
}

/// Wait up to `grace` for a child to exit on its own.
pub async fn wait_for_exit(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    match timeout(grace, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(_)) | Err(_) => None,
    }
}
