//! Domain types shared by the supervisor and the remote log channel.

mod log_event;

pub use log_event::{LogEvent, REMOTE_LEVEL_PREFIX, level_name_for};
