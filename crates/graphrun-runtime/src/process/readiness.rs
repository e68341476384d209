//! Liveness polling for the execution server.

use std::process::ExitStatus;
use std::time::Duration;

use graphrun_core::{LivenessClient, STARTUP_TIMEOUT};
use tokio::process::Child;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::error::SupervisorError;

/// Default delay between startup polls.
pub const STARTUP_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Bounded polling schedule for startup readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of liveness checks before giving up.
    pub max_attempts: u32,
    /// Delay before each check.
    pub interval: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Total time the schedule may spend sleeping.
    pub fn total_wait(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(STARTUP_TIMEOUT, STARTUP_POLL_INTERVAL)
    }
}

/// Outcome of one liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The server answered and reports ready.
    Ready,
    /// Not reachable yet, but the owned child is still alive or the error was
    /// not a refusal.
    Pending,
    /// Connection refused and no owned child to wait for.
    Unreachable,
    /// The owned child has exited.
    Exited(ExitStatus),
}

/// Run a single liveness check, consulting the owned child on refusal.
pub async fn check_readiness(client: &dyn LivenessClient, child: Option<&mut Child>) -> Readiness {
    match client.is_alive().await {
        Ok(true) => Readiness::Ready,
        Ok(false) => Readiness::Pending,
        Err(e) if e.is_connection_refused() => {
            let Some(child) = child else {
                return Readiness::Unreachable;
            };
            match child.try_wait() {
                Ok(None) => Readiness::Pending,
                Ok(Some(status)) => Readiness::Exited(status),
                Err(e) => {
                    warn!(error = %e, "Failed to poll server process status");
                    Readiness::Pending
                }
            }
        }
        Err(e) => {
            debug!(error = %e, "Liveness check failed");
            Readiness::Pending
        }
    }
}

/// Poll until the server is ready, the child exits, or `policy` runs out.
///
/// Returns the number of checks it took.
pub async fn wait_until_ready(
    policy: RetryPolicy,
    client: &dyn LivenessClient,
    mut child: Option<&mut Child>,
) -> Result<u32, SupervisorError> {
    for attempt in 1..=policy.max_attempts {
        sleep(policy.interval).await;

        match check_readiness(client, child.as_deref_mut()).await {
            Readiness::Ready => return Ok(attempt),
            Readiness::Exited(status) => return Err(SupervisorError::ServerExited { status }),
            Readiness::Pending | Readiness::Unreachable => {
                debug!(attempt, max_attempts = policy.max_attempts, "Server not ready yet");
            }
        }
    }

    Err(SupervisorError::StartupTimeout {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use graphrun_core::LivenessError;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Refuses until `ready_on`, then reports ready.
    struct CountingClient {
        calls: AtomicU32,
        ready_on: u32,
    }

    #[async_trait]
    impl LivenessClient for CountingClient {
        async fn is_alive(&self) -> Result<bool, LivenessError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.ready_on {
                Ok(true)
            } else {
                Err(LivenessError::ConnectionRefused("refused".into()))
            }
        }

        async fn kill(&self) -> Result<(), LivenessError> {
            Ok(())
        }
    }

    struct SlowClient;

    #[async_trait]
    impl LivenessClient for SlowClient {
        async fn is_alive(&self) -> Result<bool, LivenessError> {
            Err(LivenessError::Timeout(Duration::from_millis(1)))
        }

        async fn kill(&self) -> Result<(), LivenessError> {
            Ok(())
        }
    }

    const FAST: Duration = Duration::from_millis(5);

    #[test]
    fn default_policy_uses_startup_timeout() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, STARTUP_TIMEOUT);
        assert_eq!(policy.total_wait(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn refused_without_child_is_unreachable() {
        let client = CountingClient {
            calls: AtomicU32::new(0),
            ready_on: u32::MAX,
        };
        assert_eq!(check_readiness(&client, None).await, Readiness::Unreachable);
    }

    #[tokio::test]
    async fn ready_within_attempts_reports_count() {
        let client = CountingClient {
            calls: AtomicU32::new(0),
            ready_on: 3,
        };
        let attempts = wait_until_ready(RetryPolicy::new(5, FAST), &client, None)
            .await
            .unwrap();
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn exhausted_attempts_time_out_after_exact_attempts() {
        let client = CountingClient {
            calls: AtomicU32::new(0),
            ready_on: u32::MAX,
        };
        let err = wait_until_ready(RetryPolicy::new(4, FAST), &client, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::StartupTimeout { attempts: 4 }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn non_refusal_errors_count_as_pending() {
        let err = wait_until_ready(RetryPolicy::new(2, FAST), &SlowClient, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::StartupTimeout { attempts: 2 }));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn exited_child_fails_fast() {
        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg("exit 3")
            .spawn()
            .unwrap();
        let client = CountingClient {
            calls: AtomicU32::new(0),
            ready_on: u32::MAX,
        };

        let err = wait_until_ready(
            RetryPolicy::new(50, Duration::from_millis(100)),
            &client,
            Some(&mut child),
        )
        .await
        .unwrap_err();

        match err {
            SupervisorError::ServerExited { status } => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected error: {other}"),
        }
        assert!(client.calls.load(Ordering::SeqCst) < 50);
    }
}
