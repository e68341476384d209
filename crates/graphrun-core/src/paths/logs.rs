//! Log file locations.
//!
//! Server log files go to the system temp directory, which the OS may clean at
//! any time. The meta-log that remembers them lives under the data root so it
//! survives such cleanups.

use std::env;
use std::path::PathBuf;

use super::PathError;
use super::platform::data_root;

/// File name of the session log registry under the data root.
pub const SESSION_LOG_META_FILE: &str = "session_logs.txt";

/// Returns the path of the session log registry meta-file.
pub fn session_log_meta_path() -> Result<PathBuf, PathError> {
    Ok(data_root()?.join(SESSION_LOG_META_FILE))
}

/// Directory where generated server log files are written.
pub fn server_log_dir() -> PathBuf {
    env::temp_dir()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_log_dir_is_temp_dir() {
        assert_eq!(server_log_dir(), env::temp_dir());
    }

    #[test]
    fn meta_path_has_expected_file_name() {
        if let Ok(path) = session_log_meta_path() {
            assert!(path.ends_with(SESSION_LOG_META_FILE));
        }
    }
}
