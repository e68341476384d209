//! Log sink port for events received from another process.
//!
//! This port abstracts the local destination for remote log events, allowing
//! the runtime to re-emit them through `tracing` while tests capture them.

use crate::domain::LogEvent;

/// Port for dispatching a decoded log event into the local logging stream.
///
/// Implementations must be thread-safe; the receiver calls `dispatch` from one
/// task per connection.
pub trait LogEventSink: Send + Sync {
    /// Dispatch one event. Never filters by level.
    fn dispatch(&self, event: LogEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogSink;

impl LogEventSink for NoopLogSink {
    fn dispatch(&self, _event: LogEvent) {}
}
