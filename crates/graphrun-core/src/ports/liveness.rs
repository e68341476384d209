//! Liveness port for the out-of-process execution server.
//!
//! The supervisor only needs two things from the server's RPC surface:
//! "are you up" and "please exit". Everything else about the RPC schema is
//! outside this crate.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by a [`LivenessClient`].
///
/// `ConnectionRefused` is singled out because the supervisor treats it
/// differently from every other failure: with an owned child that has not
/// exited, a refused connection just means "not listening yet".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LivenessError {
    /// Nothing is listening on the server address.
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// The request did not complete in time.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Something answered, but not with a valid reply.
    #[error("Server rejected request: {0}")]
    Rejected(String),

    /// Any other transport-level failure.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl LivenessError {
    /// Check if the error means nothing is listening.
    #[must_use]
    pub const fn is_connection_refused(&self) -> bool {
        matches!(self, Self::ConnectionRefused(_))
    }
}

/// Minimal client-side view of the execution server.
#[async_trait]
pub trait LivenessClient: Send + Sync {
    /// Ask the server whether it is up.
    ///
    /// `Ok(false)` means the server answered but reported it is not ready.
    async fn is_alive(&self) -> Result<bool, LivenessError>;

    /// Ask the server to shut itself down. Best effort.
    async fn kill(&self) -> Result<(), LivenessError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LivenessClient for CountingClient {
        async fn is_alive(&self) -> Result<bool, LivenessError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(LivenessError::ConnectionRefused("127.0.0.1:9020".into()))
            } else {
                Ok(true)
            }
        }

        async fn kill(&self) -> Result<(), LivenessError> {
            Ok(())
        }
    }

    #[test]
    fn test_connection_refused_classification() {
        assert!(LivenessError::ConnectionRefused("x".into()).is_connection_refused());
        assert!(!LivenessError::Timeout(Duration::from_secs(2)).is_connection_refused());
        assert!(!LivenessError::Rejected("503".into()).is_connection_refused());
        assert!(!LivenessError::Transport("reset".into()).is_connection_refused());
    }

    #[tokio::test]
    async fn test_client_usable_as_trait_object() {
        let client: Box<dyn LivenessClient> = Box::new(CountingClient {
            calls: AtomicUsize::new(0),
        });

        let first = client.is_alive().await;
        assert!(first.unwrap_err().is_connection_refused());
        assert_eq!(client.is_alive().await, Ok(true));
        assert_eq!(client.kill().await, Ok(()));
    }
}
