//! Registry of per-session log files.
//!
//! Format: plain text meta-file, one absolute path per line
//! ```text
//! /tmp/graphrun_server_20261016_101500_000_4242.log
//! /home/me/.local/share/graphrun/session.log
//! ```
//!
//! Every registration rewrites the meta-file. Files older than the retention
//! window are deleted and dropped from the list; paths that no longer exist
//! are dropped without deletion.
//!
//! There is no cross-process lock. Two processes registering at the same
//! moment can lose one of the two entries.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use graphrun_core::{PathError, SESSION_LOG_RETENTION, session_log_meta_path};
use serde::Serialize;
use tracing::{debug, warn};

/// Outcome of one registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegisterReport {
    /// Paths persisted to the meta-file, in order. The new path is last.
    pub kept: Vec<PathBuf>,
    /// Paths dropped because they were stale or missing.
    pub evicted: Vec<PathBuf>,
    /// Stale files that could not be deleted. Also in `evicted`.
    pub delete_failures: Vec<PathBuf>,
    /// Whether the meta-file was written.
    pub persisted: bool,
}

/// Session log registry backed by a meta-file.
#[derive(Debug, Clone)]
pub struct SessionLogRegistry {
    meta_path: PathBuf,
    retention: Duration,
}

impl SessionLogRegistry {
    pub fn new(meta_path: impl Into<PathBuf>) -> Self {
        Self {
            meta_path: meta_path.into(),
            retention: SESSION_LOG_RETENTION,
        }
    }

    /// Registry at `<data_root>/session_logs.txt`.
    pub fn default_location() -> Result<Self, PathError> {
        Ok(Self::new(session_log_meta_path()?))
    }

    #[must_use]
    pub const fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn meta_path(&self) -> &Path {
        &self.meta_path
    }

    pub const fn retention(&self) -> Duration {
        self.retention
    }

    /// Paths currently listed in the meta-file.
    ///
    /// An unreadable meta-file reads as empty.
    pub fn entries(&self) -> Vec<PathBuf> {
        self.load()
    }

    /// Register `path` and evict stale entries, measured from now.
    pub fn register(&self, path: impl AsRef<Path>) -> RegisterReport {
        self.register_at(path, SystemTime::now())
    }

    /// Register `path` and evict entries older than the retention window at `now`.
    ///
    /// Never fails. Filesystem errors are logged and reflected in the report.
    pub fn register_at(&self, path: impl AsRef<Path>, now: SystemTime) -> RegisterReport {
        let path = path.as_ref();
        let mut report = RegisterReport::default();

        for entry in self.load() {
            if entry == path {
                continue;
            }

            match file_age(&entry, now) {
                Some(age) if age <= self.retention => report.kept.push(entry),
                Some(age) => {
                    debug!(path = %entry.display(), age_secs = age.as_secs(), "Evicting stale session log");
                    match fs::remove_file(&entry) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => {
                            warn!(path = %entry.display(), error = %e, "Failed to delete stale session log");
                            report.delete_failures.push(entry.clone());
                        }
                    }
                    report.evicted.push(entry);
                }
                None => {
                    debug!(path = %entry.display(), "Dropping missing session log");
                    report.evicted.push(entry);
                }
            }
        }

        report.kept.push(path.to_path_buf());

        match self.persist(&report.kept) {
            Ok(()) => report.persisted = true,
            Err(e) => {
                warn!(path = %self.meta_path.display(), error = %e, "Failed to write session log registry");
            }
        }

        report
    }

    fn load(&self) -> Vec<PathBuf> {
        let content = match fs::read_to_string(&self.meta_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.meta_path.display(), error = %e, "Failed to read session log registry");
                return Vec::new();
            }
        };

        let mut entries: Vec<PathBuf> = Vec::new();
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let entry = PathBuf::from(line);
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        }
        entries
    }

    /// Write via temp file + rename so readers never see a partial list.
    fn persist(&self, entries: &[PathBuf]) -> io::Result<()> {
        if let Some(parent) = self.meta_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut content = String::new();
        for entry in entries {
            content.push_str(&entry.to_string_lossy());
            content.push('\n');
        }

        let mut temp_name = self.meta_path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, &self.meta_path)
    }
}

/// Age of `path` at `now`, or `None` if it cannot be stat'ed.
///
/// A modification time in the future counts as age zero.
fn file_age(path: &Path, now: SystemTime) -> Option<Duration> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(now.duration_since(modified).unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry_in(dir: &TempDir) -> SessionLogRegistry {
        SessionLogRegistry::new(dir.path().join("meta").join("session_logs.txt"))
    }

    #[test]
    fn test_first_registration_creates_meta_file() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        let log = dir.path().join("a.log");
        fs::write(&log, "x").unwrap();

        let report = registry.register(&log);

        assert!(report.persisted);
        assert_eq!(report.kept, vec![log.clone()]);
        let content = fs::read_to_string(registry.meta_path()).unwrap();
        assert_eq!(content, format!("{}\n", log.display()));
    }

    #[test]
    fn test_reregistering_does_not_duplicate() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        let a = dir.path().join("a.log");
        let b = dir.path().join("b.log");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();

        registry.register(&a);
        registry.register(&b);
        registry.register(&a);

        assert_eq!(registry.entries(), vec![b, a]);
    }

    #[test]
    fn test_unregistered_path_need_not_exist() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        let future_log = dir.path().join("not-yet-written.log");

        let report = registry.register(&future_log);

        assert_eq!(report.kept, vec![future_log]);
    }

    #[test]
    fn test_unreadable_meta_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        // A directory where the meta-file should be cannot be read as text.
        let meta = dir.path().join("session_logs.txt");
        fs::create_dir_all(&meta).unwrap();
        let registry = SessionLogRegistry::new(&meta);

        assert!(registry.entries().is_empty());
        let report = registry.register(dir.path().join("a.log"));
        assert!(!report.persisted);
    }

    #[test]
    fn test_future_mtime_counts_as_fresh() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("a.log");
        fs::write(&log, "x").unwrap();
        let past = SystemTime::now() - Duration::from_secs(3600);

        assert_eq!(file_age(&log, past), Some(Duration::ZERO));
        assert_eq!(file_age(&dir.path().join("missing.log"), past), None);
    }
}
