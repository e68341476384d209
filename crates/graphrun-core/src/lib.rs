//! Core domain types and port definitions for graphrun.
//!
//! This crate has no process, socket or filesystem-mutation logic of its own
//! beyond resolving per-user directories. Adapters live in `graphrun-runtime`.
#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod paths;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{LogEvent, REMOTE_LEVEL_PREFIX, level_name_for};
pub use paths::{PathError, data_root, session_log_meta_path, server_log_dir};
pub use ports::{LivenessClient, LivenessError, LogEventSink, NoopLogSink};
pub use settings::{
    DEFAULT_HOST, DEFAULT_LOG_PORT, DEFAULT_RPC_PORT, DEFAULT_SERVER_MODULE, LOG_ADDR_ENV,
    NO_SUBPROCESS_ENV, SESSION_LOG_RETENTION, SOCKET_VERBOSITY, STARTUP_TIMEOUT, Settings,
    SettingsError, VERBOSITY_ENV, validate_settings,
};
