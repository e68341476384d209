//! Local sink that re-emits remote events through `tracing`.

use graphrun_core::{LogEvent, LogEventSink};
use tracing::{Level, debug, error, info, trace, warn};

/// Target used for re-emitted remote events, so subscribers can route them.
pub const REMOTE_TARGET: &str = "graphrun::remote";

/// Re-emits every event at its mapped level under [`REMOTE_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogEventSink for TracingSink {
    fn dispatch(&self, event: LogEvent) {
        let message = event.render();
        let logger = event.logger_name.as_str();
        let level_name = event.level_name.as_str();
        let links = event.links.join(",");

        // tracing levels are static per call site, hence one arm per level.
        match event.level() {
            Level::TRACE => {
                trace!(target: REMOTE_TARGET, logger, level_name, links, "{message}");
            }
            Level::DEBUG => {
                debug!(target: REMOTE_TARGET, logger, level_name, links, "{message}");
            }
            Level::INFO => info!(target: REMOTE_TARGET, logger, level_name, links, "{message}"),
            Level::WARN => warn!(target: REMOTE_TARGET, logger, level_name, links, "{message}"),
            _ => error!(target: REMOTE_TARGET, logger, level_name, links, "{message}"),
        }
    }
}
