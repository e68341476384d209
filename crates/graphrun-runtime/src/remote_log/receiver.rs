//! TCP server that receives framed log events from the execution server.
//!
//! Key design decisions:
//! - **Bind-then-report**: the listener is bound before `bind()` returns, so
//!   `local_addr()` is the real address and a child spawned afterwards cannot
//!   lose its first lines.
//! - **Polling accept loop**: `accept()` is bounded by the poll interval and
//!   the stop flag is checked every iteration.
//! - **One task per connection**: a malformed frame drops that connection
//!   only; other senders keep streaming.
//! - **No filtering**: every decoded event reaches the sink. Level filtering
//!   happens in the sending process.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use graphrun_core::LogEventSink;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codec::read_frame;

/// Default interval between stop-flag checks in the accept loop.
pub const RECEIVER_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on the pause after a failed `accept()`.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Pause before retrying after `accept()` fails, e.g. on fd exhaustion.
fn accept_backoff(poll_interval: Duration) -> Duration {
    poll_interval.min(ACCEPT_ERROR_BACKOFF)
}

/// Running log receiver.
pub struct LogRecordReceiver {
    local_addr: SocketAddr,
    cancel_token: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
    poll_interval: Duration,
}

impl LogRecordReceiver {
    /// Bind to `addr` and start accepting connections.
    pub async fn bind(
        addr: impl ToSocketAddrs,
        sink: Arc<dyn LogEventSink>,
    ) -> io::Result<Self> {
        Self::bind_with_poll_interval(addr, sink, RECEIVER_POLL_INTERVAL).await
    }

    /// Like [`LogRecordReceiver::bind`] with a custom stop-check interval.
    pub async fn bind_with_poll_interval(
        addr: impl ToSocketAddrs,
        sink: Arc<dyn LogEventSink>,
        poll_interval: Duration,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Log receiver listening");

        let cancel_token = CancellationToken::new();
        let join_handle = tokio::spawn(accept_loop(
            listener,
            sink,
            cancel_token.clone(),
            poll_interval,
        ));

        Ok(Self {
            local_addr,
            cancel_token,
            join_handle: Some(join_handle),
            poll_interval,
        })
    }

    /// Address the receiver is bound to.
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Ask the accept loop and all connection tasks to exit.
    ///
    /// Observed by the accept loop within one poll interval.
    pub fn request_stop(&self) {
        self.cancel_token.cancel();
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Whether the accept loop has exited.
    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    /// Request stop and wait for the accept loop to exit.
    ///
    /// Waits at most a few poll intervals, then aborts the task.
    pub async fn stop(mut self) {
        self.request_stop();

        let Some(mut join) = self.join_handle.take() else {
            return;
        };

        let grace = self.poll_interval * 2 + Duration::from_millis(500);
        match timeout(grace, &mut join).await {
            Ok(Ok(())) => debug!(addr = %self.local_addr, "Log receiver stopped"),
            Ok(Err(e)) => warn!(addr = %self.local_addr, error = %e, "Log receiver task failed"),
            Err(_) => {
                warn!(addr = %self.local_addr, "Log receiver stop timed out; aborting task");
                join.abort();
            }
        }
    }
}

impl Drop for LogRecordReceiver {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl std::fmt::Debug for LogRecordReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogRecordReceiver")
            .field("local_addr", &self.local_addr)
            .field("stop_requested", &self.is_stop_requested())
            .finish_non_exhaustive()
    }
}

async fn accept_loop(
    listener: TcpListener,
    sink: Arc<dyn LogEventSink>,
    cancel_token: CancellationToken,
    poll_interval: Duration,
) {
    while !cancel_token.is_cancelled() {
        match timeout(poll_interval, listener.accept()).await {
            Err(_) => {}
            Ok(Ok((stream, peer))) => {
                debug!(peer = %peer, "Log sender connected");
                tokio::spawn(serve_connection(
                    stream,
                    peer,
                    Arc::clone(&sink),
                    cancel_token.child_token(),
                ));
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to accept log connection");
                tokio::select! {
                    () = cancel_token.cancelled() => break,
                    () = sleep(accept_backoff(poll_interval)) => {}
                }
            }
        }
    }

    debug!("Log receiver accept loop exiting");
}

async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    sink: Arc<dyn LogEventSink>,
    cancel_token: CancellationToken,
) {
    let mut received: u64 = 0;

    loop {
        let next = tokio::select! {
            () = cancel_token.cancelled() => break,
            frame = read_frame(&mut stream) => frame,
        };

        match next {
            Ok(Some(event)) => {
                received += 1;
                sink.dispatch(event.into_remote());
            }
            Ok(None) => break,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Dropping log connection after bad frame");
                break;
            }
        }
    }

    debug!(peer = %peer, received, "Log sender disconnected");
}
