//! Execution server process management.
//!
//! # Structure
//!
//! - `ServerProcessSupervisor` - probe, spawn, readiness and termination
//! - `LaunchSpec` / `StdoutCapture` - how the server command is built
//! - `RetryPolicy` - bounded startup polling
//! - Port probing and OS-level shutdown helpers

mod error;
mod launch;
mod ports;
mod readiness;
pub mod shutdown;
mod supervisor;

pub use error::SupervisorError;
pub use launch::{LaunchSpec, StdoutCapture, can_spawn_subprocess, generate_server_log_path};
pub use ports::{PORT_PROBE_TIMEOUT, PortStatus, is_port_available, probe_port};
pub use readiness::{
    Readiness, RetryPolicy, STARTUP_POLL_INTERVAL, check_readiness, wait_until_ready,
};
pub use shutdown::{TERM_GRACE_PERIOD, terminate_child};
pub use supervisor::{
    KILL_TIMEOUT, ServerHandle, ServerProcessSupervisor, ServerState, StartOutcome,
    SupervisorConfig,
};
