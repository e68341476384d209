//! Port definitions (trait abstractions) for external collaborators.
//!
//! # Design Rules
//!
//! - No process, socket or HTTP types in any signature
//! - Traits express intent ("is the server alive", "ask it to exit")
//! - Implementations must be `Send + Sync` so supervisors can share them

pub mod liveness;
pub mod log_sink;

pub use liveness::{LivenessClient, LivenessError};
pub use log_sink::{LogEventSink, NoopLogSink};
