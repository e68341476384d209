//! HTTP adapter for the liveness port.
//!
//! Talks to the execution server's control endpoints:
//! - `GET /health` - 2xx means up. A JSON body with a `status` field other
//!   than `ok`/`ready` means up but not ready.
//! - `POST /shutdown` - asks the server to exit.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use graphrun_core::{LivenessClient, LivenessError};
use serde::Deserialize;
use tracing::debug;

/// Per-request timeout for liveness calls.
pub const LIVENESS_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

pub const HEALTH_PATH: &str = "/health";
pub const SHUTDOWN_PATH: &str = "/shutdown";

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: String,
}

/// [`LivenessClient`] over plain HTTP.
#[derive(Debug, Clone)]
pub struct HttpLivenessClient {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpLivenessClient {
    /// Client for the server at `addr`.
    pub fn new(addr: SocketAddr) -> Result<Self, LivenessError> {
        Self::with_timeout(addr, LIVENESS_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(addr: SocketAddr, request_timeout: Duration) -> Result<Self, LivenessError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LivenessError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: format!("http://{addr}"),
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn classify(&self, err: &reqwest::Error) -> LivenessError {
        if err.is_timeout() {
            LivenessError::Timeout(self.request_timeout)
        } else if err.is_connect() {
            LivenessError::ConnectionRefused(err.to_string())
        } else {
            LivenessError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl LivenessClient for HttpLivenessClient {
    async fn is_alive(&self) -> Result<bool, LivenessError> {
        let url = format!("{}{HEALTH_PATH}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "Health check answered with error status");
            return Ok(false);
        }

        let body = response.text().await.map_err(|e| self.classify(&e))?;
        match serde_json::from_str::<HealthBody>(&body) {
            Ok(health) => Ok(matches!(health.status.as_str(), "ok" | "ready")),
            Err(_) => Ok(true),
        }
    }

    async fn kill(&self) -> Result<(), LivenessError> {
        let url = format!("{}{SHUTDOWN_PATH}", self.base_url);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(LivenessError::Rejected(format!(
                "shutdown returned {}",
                response.status()
            )))
        }
    }
}
