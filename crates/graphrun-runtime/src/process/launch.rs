//! Building the execution server command line.
//!
//! The server is launched as `<interpreter> -m <entry_module> [<log_file>]`.
//! Verbosity overrides are applied to the child's environment only; the
//! parent environment is never touched.

use std::env;
use std::fs::OpenOptions;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use graphrun_core::{LOG_ADDR_ENV, NO_SUBPROCESS_ENV, SOCKET_VERBOSITY, VERBOSITY_ENV};
use tokio::process::Command;

/// Program and leading arguments of the execution server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments placed before the optional log file path.
    pub args: Vec<String>,
}

impl LaunchSpec {
    /// Run `program` with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Run `<interpreter> -m <module>`.
    pub fn module(interpreter: impl Into<PathBuf>, module: impl Into<String>) -> Self {
        Self::new(interpreter).arg("-m").arg(module)
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Where the server's stdout/stderr go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StdoutCapture {
    /// Inherit this process's streams.
    #[default]
    Inherit,
    /// Write to a freshly generated file in the server log directory.
    Generated,
    /// Write to the given file.
    File(PathBuf),
}

/// Generate a unique server log path in `dir`.
pub fn generate_server_log_path(dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f");
    dir.join(format!("graphrun_server_{stamp}_{}.log", std::process::id()))
}

/// Whether this host allows spawning the execution server.
///
/// Hosts that sandbox or replace subprocess creation set
/// `GRAPHRUN_NO_SUBPROCESS`.
pub fn can_spawn_subprocess() -> bool {
    spawn_allowed_by(env::var(NO_SUBPROCESS_ENV).ok().as_deref())
}

fn spawn_allowed_by(flag: Option<&str>) -> bool {
    match flag.map(str::trim) {
        None | Some("" | "0") => true,
        Some(v) => v.eq_ignore_ascii_case("false"),
    }
}

/// Assemble the command for `spec`.
///
/// With `log_file`, the path is appended as the last argument and both
/// stdout and stderr are appended to it. With `socket_addr`, the child gets
/// `GRAPHRUN_VERBOSITY=socket` and the receiver address.
pub(crate) fn build_command(
    spec: &LaunchSpec,
    log_file: Option<&Path>,
    socket_addr: Option<SocketAddr>,
) -> io::Result<Command> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args).stdin(Stdio::null());

    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        cmd.arg(path)
            .stdout(Stdio::from(file.try_clone()?))
            .stderr(Stdio::from(file));
    }

    if let Some(addr) = socket_addr {
        cmd.env(VERBOSITY_ENV, SOCKET_VERBOSITY)
            .env(LOG_ADDR_ENV, addr.to_string());
    }

    Ok(cmd)
}
