//! Path utilities for graphrun data directories.
//!
//! - Per-user data root (meta-log location)
//! - Server log directory (volatile, shared between processes)
//!
//! Functions return `PathBuf` and `PathError`; nothing here prompts or prints.

mod error;
mod logs;
mod platform;

pub use error::PathError;
pub use logs::{SESSION_LOG_META_FILE, server_log_dir, session_log_meta_path};
pub use platform::{DATA_DIR_ENV, data_root, resolve_data_root};
