//! Structured log event carried over the remote log channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::Level;

/// Prefix added to `level_name` for events that arrived from another process.
pub const REMOTE_LEVEL_PREFIX: &str = "remote.";

/// A single log record, as produced by the execution server.
///
/// The wire schema is fixed: unknown fields are rejected, `args` and `links`
/// default to empty lists when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogEvent {
    /// Level name, e.g. `INFO` or `remote.WARNING`.
    pub level_name: String,
    /// Message, possibly containing positional placeholders.
    pub message: String,
    /// Values substituted into `message` by [`LogEvent::render`].
    #[serde(default)]
    pub args: Vec<Value>,
    /// Name of the logger (or `tracing` target) that produced the event.
    pub logger_name: String,
    /// Presentation links (node ids, file paths). Opaque to the transport.
    #[serde(default)]
    pub links: Vec<String>,
}

impl LogEvent {
    /// Create an event with no args or links.
    pub fn new(
        level_name: impl Into<String>,
        logger_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level_name: level_name.into(),
            message: message.into(),
            args: Vec::new(),
            logger_name: logger_name.into(),
            links: Vec::new(),
        }
    }

    /// Set the positional args.
    #[must_use]
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Set the presentation links.
    #[must_use]
    pub fn with_links(mut self, links: Vec<String>) -> Self {
        self.links = links;
        self
    }

    /// Whether the event has already been tagged as remote.
    pub fn is_remote(&self) -> bool {
        self.level_name.starts_with(REMOTE_LEVEL_PREFIX)
    }

    /// Tag the event as remote-origin. Already tagged events are unchanged.
    #[must_use]
    pub fn into_remote(mut self) -> Self {
        if !self.is_remote() {
            self.level_name.insert_str(0, REMOTE_LEVEL_PREFIX);
        }
        self
    }

    /// Map `level_name` to a `tracing` level.
    ///
    /// Matching is case-insensitive and ignores the remote prefix. Unknown
    /// names map to `INFO`.
    pub fn level(&self) -> Level {
        let name = self
            .level_name
            .strip_prefix(REMOTE_LEVEL_PREFIX)
            .unwrap_or(&self.level_name);

        match name.to_ascii_uppercase().as_str() {
            "TRACE" => Level::TRACE,
            "DEBUG" => Level::DEBUG,
            "WARN" | "WARNING" => Level::WARN,
            "ERROR" | "CRITICAL" | "FATAL" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    /// Substitute `args` into `message`.
    ///
    /// Recognises `{}` and `%s`/`%d`/`%i`/`%f`/`%r`, with `{{`, `}}` and `%%`
    /// as escapes. Placeholders without a matching arg are kept verbatim.
    /// A message without args is returned untouched, escapes included.
    pub fn render(&self) -> String {
        if self.args.is_empty() {
            return self.message.clone();
        }

        let mut out = String::with_capacity(self.message.len());
        let mut args = self.args.iter();
        let mut chars = self.message.chars().peekable();

        while let Some(c) = chars.next() {
            match (c, chars.peek().copied()) {
                ('{', Some('{')) | ('}', Some('}')) | ('%', Some('%')) => {
                    chars.next();
                    out.push(c);
                }
                ('{', Some('}')) => {
                    chars.next();
                    match args.next() {
                        Some(value) => push_value(&mut out, value, false),
                        None => out.push_str("{}"),
                    }
                }
                ('%', Some(spec @ ('s' | 'd' | 'i' | 'f' | 'r'))) => {
                    chars.next();
                    match args.next() {
                        Some(value) => push_value(&mut out, value, spec == 'r'),
                        None => {
                            out.push('%');
                            out.push(spec);
                        }
                    }
                }
                _ => out.push(c),
            }
        }

        out
    }
}

fn push_value(out: &mut String, value: &Value, repr: bool) {
    match value {
        Value::String(s) if !repr => out.push_str(s),
        other => out.push_str(&other.to_string()),
    }
}

/// Level name used on the wire for a `tracing` level.
pub fn level_name_for(level: Level) -> &'static str {
    match level {
        Level::TRACE => "TRACE",
        Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARNING",
        _ => "ERROR",
    }
}
