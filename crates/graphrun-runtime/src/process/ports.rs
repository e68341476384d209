//! Port probing for the execution server address.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Default bound on a single probe connect.
pub const PORT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Result of probing a TCP port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortStatus {
    /// Something accepted the connection.
    Occupied,
    /// Connection refused, timed out or otherwise failed.
    Available,
}

impl PortStatus {
    pub const fn is_occupied(self) -> bool {
        matches!(self, Self::Occupied)
    }
}

/// Check whether anything is accepting connections on `addr`.
///
/// The probing socket is dropped before returning on every path.
pub async fn probe_port(addr: SocketAddr, connect_timeout: Duration) -> PortStatus {
    match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => {
            debug!(addr = %addr, "Port is occupied");
            PortStatus::Occupied
        }
        Ok(Err(e)) => {
            debug!(addr = %addr, error = %e, "Port is available");
            PortStatus::Available
        }
        Err(_) => {
            debug!(addr = %addr, "Port probe timed out, treating as available");
            PortStatus::Available
        }
    }
}

/// Check if a port on `addr` is free, using [`PORT_PROBE_TIMEOUT`].
pub async fn is_port_available(addr: SocketAddr) -> bool {
    !probe_port(addr, PORT_PROBE_TIMEOUT).await.is_occupied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn free_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    #[tokio::test]
    async fn probe_reports_listening_port_as_occupied() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        assert_eq!(probe_port(addr, PORT_PROBE_TIMEOUT).await, PortStatus::Occupied);
        assert!(!is_port_available(addr).await);
    }

    #[tokio::test]
    async fn probe_reports_closed_port_as_available() {
        let addr = free_addr().await;
        assert_eq!(probe_port(addr, PORT_PROBE_TIMEOUT).await, PortStatus::Available);
        assert!(is_port_available(addr).await);
    }
}
