//! Subscriber setup driven by the verbosity variable.
//!
//! Both the controlling application and the execution server call
//! [`init_logging`]. The server sees `GRAPHRUN_VERBOSITY=socket` when the
//! supervisor asked for socket logging and then also ships its events to the
//! address in `GRAPHRUN_LOG_ADDR`.

use std::env;
use std::net::SocketAddr;

use graphrun_core::{DEFAULT_HOST, DEFAULT_LOG_PORT, LOG_ADDR_ENV, SOCKET_VERBOSITY, VERBOSITY_ENV};
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::remote_log::SocketLogLayer;

/// Parsed value of the verbosity variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Variable unset or unrecognised: honour `RUST_LOG`, default `info`.
    Default,
    /// Numeric tier: 0 warn, 1 info, 2 debug, 3+ trace.
    Tier(u8),
    /// Ship events to the log receiver in addition to stderr.
    Socket,
}

impl Verbosity {
    /// Parse a raw variable value.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case(SOCKET_VERBOSITY) => Self::Socket,
            Some(v) => v.parse().map_or(Self::Default, Self::Tier),
            None => Self::Default,
        }
    }

    /// Read `GRAPHRUN_VERBOSITY`.
    pub fn from_env() -> Self {
        Self::parse(env::var(VERBOSITY_ENV).ok().as_deref())
    }

    /// Fixed level for numeric tiers, `None` otherwise.
    pub const fn level_filter(self) -> Option<LevelFilter> {
        match self {
            Self::Tier(0) => Some(LevelFilter::WARN),
            Self::Tier(1) => Some(LevelFilter::INFO),
            Self::Tier(2) => Some(LevelFilter::DEBUG),
            Self::Tier(_) => Some(LevelFilter::TRACE),
            Self::Default | Self::Socket => None,
        }
    }
}

/// Errors from [`init_logging`].
#[derive(Debug, Error)]
pub enum LoggingError {
    /// `GRAPHRUN_LOG_ADDR` is not a `host:port` socket address.
    #[error("Invalid log receiver address {0:?}")]
    InvalidAddr(String),

    /// The forwarder thread could not be started.
    #[error("Failed to start log forwarder: {0}")]
    Forwarder(#[from] std::io::Error),

    /// A global subscriber is already installed.
    #[error("Logging already initialised: {0}")]
    AlreadyInitialized(String),
}

/// Address of the log receiver as seen by the server process.
pub fn receiver_addr_from_env() -> Result<SocketAddr, LoggingError> {
    let raw = env::var(LOG_ADDR_ENV).unwrap_or_else(|_| format!("{DEFAULT_HOST}:{DEFAULT_LOG_PORT}"));
    raw.parse().map_err(|_| LoggingError::InvalidAddr(raw))
}

/// Install the global subscriber for `verbosity`.
///
/// Level filtering applies to every layer, including the socket layer, so
/// filtered events never cross the network.
pub fn init_logging(verbosity: Verbosity) -> Result<(), LoggingError> {
    let filter = match verbosity.level_filter() {
        Some(level) => EnvFilter::default().add_directive(level.into()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let socket_layer = match verbosity {
        Verbosity::Socket => Some(SocketLogLayer::new(receiver_addr_from_env()?)?),
        Verbosity::Default | Verbosity::Tier(_) => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(socket_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}

/// Install the global subscriber according to `GRAPHRUN_VERBOSITY`.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    init_logging(Verbosity::from_env())
}
