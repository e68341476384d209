//! Shared fixtures for graphrun-runtime integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use graphrun_core::{LivenessClient, LivenessError, LogEvent, LogEventSink};
use tokio::net::TcpListener;

/// Sink that records every dispatched event.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<LogEvent>>,
}

impl CaptureSink {
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    /// Poll until at least `count` events arrived or `deadline` passes.
    pub async fn wait_for(&self, count: usize, deadline: Duration) -> Vec<LogEvent> {
        let step = Duration::from_millis(20);
        let mut waited = Duration::ZERO;
        while self.len() < count && waited < deadline {
            tokio::time::sleep(step).await;
            waited += step;
        }
        self.events()
    }
}

impl LogEventSink for CaptureSink {
    fn dispatch(&self, event: LogEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Liveness client that replays a script of answers.
///
/// Once the script is exhausted, `fallback` is returned forever.
pub struct ScriptedLiveness {
    script: Mutex<VecDeque<Result<bool, LivenessError>>>,
    fallback: Result<bool, LivenessError>,
    kill_result: Result<(), LivenessError>,
    alive_calls: AtomicUsize,
    kill_calls: AtomicUsize,
}

impl ScriptedLiveness {
    pub fn new(
        script: impl IntoIterator<Item = Result<bool, LivenessError>>,
        fallback: Result<bool, LivenessError>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            kill_result: Err(refused()),
            alive_calls: AtomicUsize::new(0),
            kill_calls: AtomicUsize::new(0),
        }
    }

    /// Always refuses: nothing is listening.
    pub fn refusing() -> Self {
        Self::new([], Err(refused()))
    }

    /// Always ready, and accepts kill requests.
    pub fn ready() -> Self {
        Self::new([], Ok(true)).with_kill_result(Ok(()))
    }

    pub fn with_kill_result(mut self, result: Result<(), LivenessError>) -> Self {
        self.kill_result = result;
        self
    }

    pub fn alive_calls(&self) -> usize {
        self.alive_calls.load(Ordering::SeqCst)
    }

    pub fn kill_calls(&self) -> usize {
        self.kill_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LivenessClient for ScriptedLiveness {
    async fn is_alive(&self) -> Result<bool, LivenessError> {
        self.alive_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }

    async fn kill(&self) -> Result<(), LivenessError> {
        self.kill_calls.fetch_add(1, Ordering::SeqCst);
        self.kill_result.clone()
    }
}

pub fn refused() -> LivenessError {
    LivenessError::ConnectionRefused("connection refused".to_string())
}

/// A loopback address nothing is listening on.
pub async fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Poll `path` until it contains `needle` or `deadline` passes.
pub async fn wait_for_file_containing(path: &std::path::Path, needle: &str, deadline: Duration) -> String {
    let step = Duration::from_millis(20);
    let mut waited = Duration::ZERO;
    loop {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        if content.contains(needle) || waited >= deadline {
            return content;
        }
        tokio::time::sleep(step).await;
        waited += step;
    }
}
