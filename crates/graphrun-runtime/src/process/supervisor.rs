//! Execution server supervisor.
//!
//! The supervisor owns the server handle internally, behind a
//! `tokio::sync::Mutex`, so callers share one `ServerProcessSupervisor` and
//! never hold handles themselves.
//!
//! Key design decisions:
//! - **Probe before spawn**: a compatible server already on the port is
//!   reused and marked not-owned. Anything else on the port is a conflict.
//! - **Receiver before child**: the log receiver is bound before the child
//!   is spawned so no early server lines are lost.
//! - **Global termination**: `terminate()` always asks whatever answers at the
//!   well-known address to exit. OS signals only go to an owned child.
//! - **Terminate never fails**: every failure is logged and cleanup continues.

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use graphrun_core::{
    DEFAULT_HOST, DEFAULT_LOG_PORT, DEFAULT_RPC_PORT, DEFAULT_SERVER_MODULE, LivenessClient,
    LogEventSink, Settings, SettingsError, server_log_dir, validate_settings,
};
use serde::Serialize;
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::error::SupervisorError;
use super::launch::{LaunchSpec, StdoutCapture, build_command, can_spawn_subprocess, generate_server_log_path};
use super::ports::{PORT_PROBE_TIMEOUT, probe_port};
use super::readiness::{Readiness, RetryPolicy, check_readiness, wait_until_ready};
use super::shutdown::{TERM_GRACE_PERIOD, terminate_child, wait_for_exit};
use crate::remote_log::{LogRecordReceiver, RECEIVER_POLL_INTERVAL};
use crate::session_log::SessionLogRegistry;

/// Bound on the graceful kill RPC and on waiting for the child afterwards.
pub const KILL_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle state of the supervised server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    Idle,
    Probing,
    Launching,
    AwaitingReady,
    Running,
    Failed,
    Stopping,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Probing => "probing",
            Self::Launching => "launching",
            Self::AwaitingReady => "awaiting_ready",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Result of a successful `start()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// This supervisor spawned the server and owns its process.
    Owned { pid: Option<u32> },
    /// A compatible server was already answering; it belongs to someone else.
    NotOwned,
}

impl StartOutcome {
    pub const fn is_owned(self) -> bool {
        matches!(self, Self::Owned { .. })
    }
}

/// Record of the server this supervisor is managing.
#[derive(Debug)]
pub struct ServerHandle {
    child: Option<Child>,
    log_file_path: Option<PathBuf>,
    socket_logging_enabled: bool,
    state: ServerState,
}

impl ServerHandle {
    const fn new(socket_logging_enabled: bool) -> Self {
        Self {
            child: None,
            log_file_path: None,
            socket_logging_enabled,
            state: ServerState::Probing,
        }
    }

    /// Whether this handle spawned the server process.
    pub const fn owns_child(&self) -> bool {
        self.child.is_some()
    }

    /// PID of the owned child, if any.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    pub fn log_file_path(&self) -> Option<&Path> {
        self.log_file_path.as_deref()
    }

    pub const fn socket_logging_enabled(&self) -> bool {
        self.socket_logging_enabled
    }

    pub const fn state(&self) -> ServerState {
        self.state
    }

    fn outcome(&self) -> StartOutcome {
        if self.owns_child() {
            StartOutcome::Owned { pid: self.pid() }
        } else {
            StartOutcome::NotOwned
        }
    }
}

/// Configuration for a [`ServerProcessSupervisor`].
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Well-known address of the execution server.
    pub server_addr: SocketAddr,
    /// Address the log receiver binds. Port 0 picks an ephemeral port.
    pub log_receiver_addr: SocketAddr,
    /// Command that starts the server.
    pub launch: LaunchSpec,
    /// Startup polling schedule.
    pub startup: RetryPolicy,
    /// Forward server logs over a socket into this process.
    pub socket_logging: bool,
    /// Where server stdout/stderr go.
    pub stdout_capture: StdoutCapture,
    /// Directory for generated server log files.
    pub log_dir: PathBuf,
    /// Bound on the graceful kill RPC and the wait that follows it.
    pub kill_timeout: Duration,
    /// SIGTERM to SIGKILL grace period for an owned child.
    pub term_grace: Duration,
    /// Bound on the port probe connect.
    pub probe_timeout: Duration,
    /// Stop-check interval of the log receiver.
    pub receiver_poll_interval: Duration,
    /// Override for the host's subprocess capability. `None` detects it.
    pub allow_spawn: Option<bool>,
}

impl SupervisorConfig {
    /// Defaults for launching `launch` at the well-known addresses.
    pub fn new(launch: LaunchSpec) -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_RPC_PORT)),
            log_receiver_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_LOG_PORT)),
            launch,
            startup: RetryPolicy::default(),
            socket_logging: false,
            stdout_capture: StdoutCapture::Inherit,
            log_dir: server_log_dir(),
            kill_timeout: KILL_TIMEOUT,
            term_grace: TERM_GRACE_PERIOD,
            probe_timeout: PORT_PROBE_TIMEOUT,
            receiver_poll_interval: RECEIVER_POLL_INTERVAL,
            allow_spawn: None,
        }
    }

    /// Build a config from validated settings.
    pub fn from_settings(settings: &Settings, launch: LaunchSpec) -> Result<Self, SettingsError> {
        validate_settings(settings)?;

        let host = settings.effective_host();
        let mut config = Self::new(launch);
        config.server_addr = resolve(host, settings.effective_rpc_port())?;
        config.log_receiver_addr = resolve(host, settings.effective_log_port())?;
        config.startup.max_attempts = settings.effective_startup_attempts();
        config.socket_logging = settings.socket_logging.unwrap_or(false);
        if settings.capture_stdout.unwrap_or(false) {
            config.stdout_capture = StdoutCapture::Generated;
        }
        Ok(config)
    }

    #[must_use]
    pub const fn with_server_addr(mut self, addr: SocketAddr) -> Self {
        self.server_addr = addr;
        self
    }

    #[must_use]
    pub const fn with_log_receiver_addr(mut self, addr: SocketAddr) -> Self {
        self.log_receiver_addr = addr;
        self
    }

    #[must_use]
    pub const fn with_startup(mut self, policy: RetryPolicy) -> Self {
        self.startup = policy;
        self
    }

    #[must_use]
    pub const fn with_socket_logging(mut self, enabled: bool) -> Self {
        self.socket_logging = enabled;
        self
    }

    #[must_use]
    pub fn with_stdout_capture(mut self, capture: StdoutCapture) -> Self {
        self.stdout_capture = capture;
        self
    }

    #[must_use]
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    #[must_use]
    pub const fn with_kill_timeout(mut self, kill_timeout: Duration) -> Self {
        self.kill_timeout = kill_timeout;
        self
    }

    #[must_use]
    pub const fn with_term_grace(mut self, grace: Duration) -> Self {
        self.term_grace = grace;
        self
    }

    #[must_use]
    pub const fn with_receiver_poll_interval(mut self, interval: Duration) -> Self {
        self.receiver_poll_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_allow_spawn(mut self, allow: bool) -> Self {
        self.allow_spawn = Some(allow);
        self
    }

    fn spawn_allowed(&self) -> bool {
        self.allow_spawn.unwrap_or_else(can_spawn_subprocess)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::new(LaunchSpec::module("python3", DEFAULT_SERVER_MODULE))
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, SettingsError> {
    let host = if host.is_empty() { DEFAULT_HOST } else { host };
    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| SettingsError::InvalidHost(format!("{host}:{port}")))
}

#[derive(Default)]
struct Inner {
    handle: Option<ServerHandle>,
    receiver: Option<LogRecordReceiver>,
}

/// How the graceful kill RPC went.
enum GracefulKill {
    Accepted,
    Unreachable,
    Failed(String),
}

/// Supervisor for the execution server process.
///
/// # Example
///
/// ```ignore
/// let client = Arc::new(HttpLivenessClient::new(config.server_addr)?);
/// let supervisor = ServerProcessSupervisor::new(config, client, Arc::new(TracingSink));
/// supervisor.start().await?;
/// // ... submit work over RPC ...
/// supervisor.terminate().await;
/// ```
pub struct ServerProcessSupervisor {
    config: SupervisorConfig,
    client: Arc<dyn LivenessClient>,
    sink: Arc<dyn LogEventSink>,
    registry: Option<SessionLogRegistry>,
    inner: Mutex<Inner>,
}

impl ServerProcessSupervisor {
    pub fn new(
        config: SupervisorConfig,
        client: Arc<dyn LivenessClient>,
        sink: Arc<dyn LogEventSink>,
    ) -> Self {
        Self {
            config,
            client,
            sink,
            registry: None,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Register generated server log files with `registry`.
    #[must_use]
    pub fn with_session_registry(mut self, registry: SessionLogRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub const fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Ensure a compatible server is reachable at the well-known address.
    ///
    /// Reuses a server that is already answering, otherwise spawns one and
    /// waits for it to become ready. Calling it again while the server is
    /// ready returns the same outcome without spawning.
    ///
    /// # Errors
    ///
    /// See [`SupervisorError`]. On error the handle is left in
    /// [`ServerState::Failed`]; call [`terminate`](Self::terminate) to clean up.
    pub async fn start(&self) -> Result<StartOutcome, SupervisorError> {
        if !self.config.spawn_allowed() {
            return Err(SupervisorError::SpawnUnsupported);
        }

        let mut inner = self.inner.lock().await;

        if let Some(handle) = inner.handle.as_mut() {
            if handle.state == ServerState::Running {
                let child = handle.child.as_mut();
                if check_readiness(self.client.as_ref(), child).await == Readiness::Ready {
                    debug!("Execution server already running");
                    return Ok(handle.outcome());
                }
                warn!("Previously started execution server is no longer ready; restarting");
            }
        }

        if inner.handle.is_some() || inner.receiver.is_some() {
            self.teardown(&mut inner).await;
        }

        let mut handle = ServerHandle::new(self.config.socket_logging);
        let result = self.bring_up(&mut handle, &mut inner.receiver).await;

        if let Err(e) = &result {
            warn!(error = %e, "Execution server failed to start");
            handle.state = ServerState::Failed;
            if let Some(receiver) = inner.receiver.take() {
                receiver.stop().await;
            }
        }

        inner.handle = Some(handle);
        result
    }

    async fn bring_up(
        &self,
        handle: &mut ServerHandle,
        receiver_slot: &mut Option<LogRecordReceiver>,
    ) -> Result<StartOutcome, SupervisorError> {
        let addr = self.config.server_addr;

        handle.state = ServerState::Probing;
        if probe_port(addr, self.config.probe_timeout).await.is_occupied() {
            return match self.client.is_alive().await {
                Ok(true) => {
                    info!(addr = %addr, "Reusing execution server that is already running");
                    handle.state = ServerState::Running;
                    Ok(StartOutcome::NotOwned)
                }
                Ok(false) => Err(SupervisorError::PortConflict { addr }),
                Err(e) => {
                    debug!(addr = %addr, error = %e, "Occupied port failed liveness check");
                    Err(SupervisorError::PortConflict { addr })
                }
            };
        }

        handle.state = ServerState::Launching;

        let log_file = match &self.config.stdout_capture {
            StdoutCapture::Inherit => None,
            StdoutCapture::Generated => {
                let path = generate_server_log_path(&self.config.log_dir);
                if let Some(registry) = self.registry.clone() {
                    let registered = path.clone();
                    if let Err(e) =
                        tokio::task::spawn_blocking(move || registry.register(registered)).await
                    {
                        warn!(path = %path.display(), error = %e, "Session log registration failed");
                    }
                }
                Some(path)
            }
            StdoutCapture::File(path) => Some(path.clone()),
        };
        handle.log_file_path.clone_from(&log_file);

        let socket_addr = if self.config.socket_logging {
            let receiver = LogRecordReceiver::bind_with_poll_interval(
                self.config.log_receiver_addr,
                Arc::clone(&self.sink),
                self.config.receiver_poll_interval,
            )
            .await
            .map_err(|source| SupervisorError::LogReceiver {
                addr: self.config.log_receiver_addr,
                source,
            })?;
            let bound = receiver.local_addr();
            *receiver_slot = Some(receiver);
            Some(bound)
        } else {
            None
        };

        let mut cmd = build_command(&self.config.launch, log_file.as_deref(), socket_addr)
            .map_err(|source| SupervisorError::LogFile {
                path: log_file.clone().unwrap_or_default(),
                source,
            })?;

        let program = self.config.launch.program.display().to_string();
        let child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
            program: program.clone(),
            source,
        })?;
        let pid = child.id();
        info!(
            program = %program,
            pid = ?pid,
            log_file = ?log_file,
            socket_logging = socket_addr.is_some(),
            "Spawned execution server"
        );
        handle.child = Some(child);

        handle.state = ServerState::AwaitingReady;
        let attempts =
            wait_until_ready(self.config.startup, self.client.as_ref(), handle.child.as_mut())
                .await?;

        info!(addr = %addr, pid = ?pid, attempts, "Execution server is ready");
        handle.state = ServerState::Running;
        Ok(StartOutcome::Owned { pid })
    }

    /// Stop the execution server and release the log receiver.
    ///
    /// Always asks the server at the well-known address to exit, whether or
    /// not this supervisor spawned it. An owned child that does not exit in
    /// time gets SIGTERM, then SIGKILL. Never fails; a call with nothing
    /// running is a no-op.
    pub async fn terminate(&self) {
        let mut inner = self.inner.lock().await;
        self.teardown(&mut inner).await;
    }

    async fn teardown(&self, inner: &mut Inner) {
        let mut handle = inner.handle.take();
        if let Some(h) = handle.as_mut() {
            h.state = ServerState::Stopping;
        }

        let child = handle.as_mut().and_then(|h| h.child.as_mut());
        self.stop_server(child).await;

        if let Some(receiver) = inner.receiver.take() {
            receiver.stop().await;
        }

        debug!("Execution server supervisor is idle");
    }

    async fn stop_server(&self, child: Option<&mut Child>) {
        let kill_timeout = self.config.kill_timeout;

        let graceful = match timeout(kill_timeout, self.client.kill()).await {
            Ok(Ok(())) => GracefulKill::Accepted,
            Ok(Err(e)) if e.is_connection_refused() => GracefulKill::Unreachable,
            Ok(Err(e)) => GracefulKill::Failed(e.to_string()),
            Err(_) => GracefulKill::Failed(format!("no reply within {kill_timeout:?}")),
        };

        let Some(child) = child else {
            match graceful {
                GracefulKill::Accepted => info!("Asked execution server to exit"),
                GracefulKill::Unreachable => debug!("No execution server reachable"),
                GracefulKill::Failed(reason) => {
                    warn!(reason = %reason, "Graceful kill failed for a server this process does not own");
                }
            }
            return;
        };

        match graceful {
            GracefulKill::Accepted => {
                if let Some(status) = wait_for_exit(child, kill_timeout).await {
                    info!(status = %status, "Execution server exited");
                    return;
                }
                warn!("Execution server still running after graceful kill");
            }
            GracefulKill::Unreachable => debug!("Execution server unreachable; signalling process"),
            GracefulKill::Failed(reason) => {
                warn!(reason = %reason, "Graceful kill failed; signalling process");
            }
        }

        match terminate_child(child, self.config.term_grace).await {
            Ok(status) => info!(status = %status, "Execution server terminated"),
            Err(e) => warn!(error = %e, "Failed to terminate execution server process"),
        }
    }

    /// Whether a compatible server currently answers at the well-known address.
    pub async fn is_running(&self) -> bool {
        let mut inner = self.inner.lock().await;
        let child = inner.handle.as_mut().and_then(|h| h.child.as_mut());
        check_readiness(self.client.as_ref(), child).await == Readiness::Ready
    }

    /// Current lifecycle state. [`ServerState::Idle`] when there is no handle.
    pub async fn state(&self) -> ServerState {
        self.inner
            .lock()
            .await
            .handle
            .as_ref()
            .map_or(ServerState::Idle, ServerHandle::state)
    }

    /// Whether the current handle spawned the server.
    pub async fn owns_server(&self) -> bool {
        self.inner
            .lock()
            .await
            .handle
            .as_ref()
            .is_some_and(ServerHandle::owns_child)
    }

    /// File receiving the server's stdout/stderr, if captured.
    pub async fn log_file_path(&self) -> Option<PathBuf> {
        self.inner
            .lock()
            .await
            .handle
            .as_ref()
            .and_then(|h| h.log_file_path.clone())
    }

    /// Address of the running log receiver.
    pub async fn receiver_addr(&self) -> Option<SocketAddr> {
        self.inner
            .lock()
            .await
            .receiver
            .as_ref()
            .map(LogRecordReceiver::local_addr)
    }
}

impl fmt::Debug for ServerProcessSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerProcessSupervisor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_runs_server_module() {
        let config = SupervisorConfig::default();
        assert_eq!(config.launch.program, PathBuf::from("python3"));
        assert_eq!(config.launch.args, vec!["-m", DEFAULT_SERVER_MODULE]);
        assert_eq!(config.launch.args, vec!["-m", "graphrun.server"]);
    }

    #[test]
    fn test_config_from_default_settings() {
        let config =
            SupervisorConfig::from_settings(&Settings::with_defaults(), LaunchSpec::new("python3"))
                .unwrap();
        assert_eq!(config.server_addr.port(), DEFAULT_RPC_PORT);
        assert_eq!(config.log_receiver_addr.port(), DEFAULT_LOG_PORT);
        assert_eq!(config.startup.max_attempts, graphrun_core::STARTUP_TIMEOUT);
        assert!(!config.socket_logging);
        assert_eq!(config.stdout_capture, StdoutCapture::Inherit);
    }

    #[test]
    fn test_config_from_settings_applies_overrides() {
        let settings = Settings {
            rpc_port: Some(19020),
            log_port: Some(19021),
            startup_attempts: Some(12),
            socket_logging: Some(true),
            capture_stdout: Some(true),
            ..Default::default()
        };
        let config = SupervisorConfig::from_settings(&settings, LaunchSpec::new("python3")).unwrap();
        assert_eq!(config.server_addr.port(), 19020);
        assert_eq!(config.log_receiver_addr.port(), 19021);
        assert_eq!(config.startup.max_attempts, 12);
        assert!(config.socket_logging);
        assert_eq!(config.stdout_capture, StdoutCapture::Generated);
    }

    #[test]
    fn test_config_rejects_invalid_settings() {
        let settings = Settings {
            rpc_port: Some(DEFAULT_LOG_PORT),
            ..Default::default()
        };
        assert!(matches!(
            SupervisorConfig::from_settings(&settings, LaunchSpec::new("python3")),
            Err(SettingsError::PortClash(_))
        ));
    }

    #[test]
    fn test_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ServerState::AwaitingReady).unwrap(),
            "\"awaiting_ready\""
        );
        assert_eq!(ServerState::Running.to_string(), "running");
    }

    #[test]
    fn test_start_outcome_ownership() {
        assert!(StartOutcome::Owned { pid: Some(1) }.is_owned());
        assert!(!StartOutcome::NotOwned.is_owned());
    }
}
