//! Runtime adapters for graphrun: execution server supervision, the remote
//! log channel, session log bookkeeping and logging setup.
#![deny(unsafe_code)]

pub mod liveness;
pub mod logging;
pub mod process;
pub mod remote_log;
pub mod session_log;

// Re-export the supervisor surface
pub use process::{
    LaunchSpec, RetryPolicy, ServerProcessSupervisor, ServerState, StartOutcome, StdoutCapture,
    SupervisorConfig, SupervisorError,
};

// Re-export the remote log channel
pub use remote_log::{FrameError, LogRecordReceiver, SocketLogLayer, TracingSink};

// Re-export adapters and helpers
pub use liveness::HttpLivenessClient;
pub use logging::{LoggingError, Verbosity, init_logging, init_logging_from_env};
pub use session_log::{RegisterReport, SessionLogRegistry};
