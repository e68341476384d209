//! Errors surfaced by `ServerProcessSupervisor::start`.
//!
//! Only the start path returns errors. Termination and registry failures are
//! logged and swallowed where they happen.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Error from supervisor start operations.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The well-known port is held by something that does not answer the
    /// liveness protocol.
    #[error(
        "Port {addr} is in use by another process that is not a compatible execution server"
    )]
    PortConflict { addr: SocketAddr },

    /// The host environment forbids creating child processes.
    #[error("This host environment does not allow starting the execution server as a subprocess")]
    SpawnUnsupported,

    /// The child was launched but never became reachable.
    #[error("The execution server failed to start in time ({attempts} liveness checks)")]
    StartupTimeout { attempts: u32 },

    /// The child exited before it became reachable.
    #[error("The execution server exited during startup ({status})")]
    ServerExited { status: ExitStatus },

    /// The OS refused to spawn the child.
    #[error("Failed to spawn execution server {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The log receiver could not bind its address.
    #[error("Failed to start log receiver on {addr}: {source}")]
    LogReceiver {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The server log file could not be opened for stdout capture.
    #[error("Failed to open server log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SupervisorError {
    /// Whether retrying `start()` later could succeed without user action.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::StartupTimeout { .. } | Self::ServerExited { .. })
    }
}
