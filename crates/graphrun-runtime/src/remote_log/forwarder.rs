//! Sending side of the remote log channel.
//!
//! Used inside the execution server when its verbosity is `socket`. The layer
//! turns `tracing` events into [`LogEvent`]s and hands them to a writer
//! thread, so the logging call site never waits on the network.

use std::fmt::{self, Write as _};
use std::io::Write as _;
use std::net::{SocketAddr, TcpStream};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;
use std::time::Duration;

use graphrun_core::{LogEvent, level_name_for};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use super::codec::encode_frame;
use super::sink::REMOTE_TARGET;

/// Events buffered between the logging call sites and the writer thread.
pub const FORWARD_QUEUE_CAPACITY: usize = 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// `tracing` layer that ships events to a `LogRecordReceiver`.
///
/// When the queue is full, events are dropped rather than blocking. The
/// writer connects lazily and reconnects after a failed write.
pub struct SocketLogLayer {
    tx: SyncSender<LogEvent>,
}

impl SocketLogLayer {
    /// Create the layer and start its writer thread.
    pub fn new(addr: SocketAddr) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::sync_channel(FORWARD_QUEUE_CAPACITY);
        thread::Builder::new()
            .name("graphrun-log-forwarder".to_string())
            .spawn(move || writer_loop(addr, &rx))?;
        Ok(Self { tx })
    }
}

impl<S: Subscriber> Layer<S> for SocketLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        // Re-emitted remote events must not bounce back to the sender.
        if meta.target() == REMOTE_TARGET {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let log_event = LogEvent::new(level_name_for(*meta.level()), meta.target(), visitor.finish());
        // Full or disconnected: the event is dropped.
        let _ = self.tx.try_send(log_event);
    }
}

impl fmt::Debug for SocketLogLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketLogLayer").finish_non_exhaustive()
    }
}

/// Collects the `message` field plus `key=value` pairs for the other fields.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields
        } else {
            format!("{} {}", self.message, self.fields)
        }
    }

    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}

fn writer_loop(addr: SocketAddr, rx: &Receiver<LogEvent>) {
    let mut stream: Option<TcpStream> = None;

    // Ends once every sender (the layer) has been dropped and the queue drained.
    while let Ok(event) = rx.recv() {
        let Ok(frame) = encode_frame(&event) else {
            continue;
        };

        if stream.is_none() {
            stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).ok();
        }

        // A failed write drops this event and forces a reconnect on the next one.
        if let Some(conn) = stream.as_mut() {
            if conn.write_all(&frame).is_err() {
                stream = None;
            }
        }
    }

    if let Some(mut conn) = stream {
        let _ = conn.flush();
    }
}
