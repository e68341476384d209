//! Settings and well-known constants for the execution server.
//!
//! These are pure values with no infrastructure dependencies. The runtime
//! crate turns them into a `SupervisorConfig`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Host the execution server and the log receiver listen on.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Well-known port of the execution (RPC) server.
pub const DEFAULT_RPC_PORT: u16 = 9020;

/// Port of the log receiver. Distinct from the RPC port.
pub const DEFAULT_LOG_PORT: u16 = 9021;

/// Number of liveness polls before giving up on a freshly spawned server.
pub const STARTUP_TIMEOUT: u32 = 5;

/// Age after which a session log file is evicted from the registry.
pub const SESSION_LOG_RETENTION: Duration = Duration::from_secs(48 * 60 * 60);

/// Entry module passed to the interpreter with `-m`.
pub const DEFAULT_SERVER_MODULE: &str = "graphrun.server";

/// Verbosity variable read by the server process.
pub const VERBOSITY_ENV: &str = "GRAPHRUN_VERBOSITY";

/// Verbosity value that makes the server ship its logs over a socket.
pub const SOCKET_VERBOSITY: &str = "socket";

/// Address (`host:port`) of the log receiver, as seen by the server process.
pub const LOG_ADDR_ENV: &str = "GRAPHRUN_LOG_ADDR";

/// When set (to anything but `0`), the host forbids spawning subprocesses.
pub const NO_SUBPROCESS_ENV: &str = "GRAPHRUN_NO_SUBPROCESS";

/// Execution server settings.
///
/// All fields are optional to support partial configuration and graceful defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Host the server listens on.
    pub host: Option<String>,

    /// Port of the execution server.
    pub rpc_port: Option<u16>,

    /// Port of the log receiver.
    pub log_port: Option<u16>,

    /// Number of startup liveness polls.
    pub startup_attempts: Option<u32>,

    /// Forward server logs over a socket into this process.
    pub socket_logging: Option<bool>,

    /// Redirect server stdout/stderr into a log file.
    pub capture_stdout: Option<bool>,
}

impl Settings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            host: Some(DEFAULT_HOST.to_string()),
            rpc_port: Some(DEFAULT_RPC_PORT),
            log_port: Some(DEFAULT_LOG_PORT),
            startup_attempts: Some(STARTUP_TIMEOUT),
            socket_logging: Some(false),
            capture_stdout: Some(false),
        }
    }

    /// Get the effective host (with default fallback).
    #[must_use]
    pub fn effective_host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    /// Get the effective RPC port (with default fallback).
    #[must_use]
    pub const fn effective_rpc_port(&self) -> u16 {
        match self.rpc_port {
            Some(port) => port,
            None => DEFAULT_RPC_PORT,
        }
    }

    /// Get the effective log receiver port (with default fallback).
    #[must_use]
    pub const fn effective_log_port(&self) -> u16 {
        match self.log_port {
            Some(port) => port,
            None => DEFAULT_LOG_PORT,
        }
    }

    /// Get the effective startup attempt count (with default fallback).
    #[must_use]
    pub const fn effective_startup_attempts(&self) -> u32 {
        match self.startup_attempts {
            Some(attempts) => attempts,
            None => STARTUP_TIMEOUT,
        }
    }
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SettingsError {
    #[error("Port should be >= 1024 (privileged ports require root), got {0}")]
    InvalidPort(u16),

    #[error("RPC port and log port must differ, both are {0}")]
    PortClash(u16),

    #[error("Startup attempts must be between 1 and 600, got {0}")]
    InvalidStartupAttempts(u32),

    #[error("Host cannot be empty")]
    EmptyHost,

    #[error("Cannot resolve {0} to a socket address")]
    InvalidHost(String),
}

/// Validate settings values.
pub fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    for port in [settings.rpc_port, settings.log_port].into_iter().flatten() {
        if port < 1024 {
            return Err(SettingsError::InvalidPort(port));
        }
    }

    if settings.effective_rpc_port() == settings.effective_log_port() {
        return Err(SettingsError::PortClash(settings.effective_rpc_port()));
    }

    if let Some(attempts) = settings.startup_attempts {
        if !(1..=600).contains(&attempts) {
            return Err(SettingsError::InvalidStartupAttempts(attempts));
        }
    }

    if settings.host.as_ref().is_some_and(|h| h.trim().is_empty()) {
        return Err(SettingsError::EmptyHost);
    }

    Ok(())
}
