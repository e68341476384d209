//! Liveness adapters for the execution server.

mod http;

pub use http::{HEALTH_PATH, HttpLivenessClient, LIVENESS_REQUEST_TIMEOUT, SHUTDOWN_PATH};
