//! Remote log channel between the execution server and this process.
//!
//! # Structure
//!
//! - `codec` - `[u32 BE length][JSON LogEvent]` framing
//! - `LogRecordReceiver` - TCP server decoding frames into a `LogEventSink`
//! - `TracingSink` - default sink, re-emits events through `tracing`
//! - `SocketLogLayer` - sending side, a `tracing` layer for the server process

pub mod codec;
mod forwarder;
mod receiver;
mod sink;

pub use codec::{FrameError, MAX_FRAME_LEN, decode_frame, encode_frame, read_frame, write_frame};
pub use forwarder::{FORWARD_QUEUE_CAPACITY, SocketLogLayer};
pub use receiver::{LogRecordReceiver, RECEIVER_POLL_INTERVAL};
pub use sink::{REMOTE_TARGET, TracingSink};
