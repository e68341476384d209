//! Platform-specific data root resolution.

use std::env;
use std::fs;
use std::path::PathBuf;

use super::error::PathError;

/// Environment variable that overrides the data root.
pub const DATA_DIR_ENV: &str = "GRAPHRUN_DATA_DIR";

/// Get the root directory for per-user application data.
///
/// Resolution order:
/// 1. `GRAPHRUN_DATA_DIR` environment variable (highest priority)
/// 2. System data directory (e.g., `~/.local/share/graphrun`)
///
/// The directory is created if missing.
pub fn data_root() -> Result<PathBuf, PathError> {
    let root = resolve_data_root(env::var(DATA_DIR_ENV).ok().as_deref())?;

    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| PathError::CreateFailed {
            path: root.clone(),
            reason: e.to_string(),
        })?;
    }

    Ok(root)
}

/// Pure part of [`data_root`]: pick the directory without touching the disk.
pub fn resolve_data_root(override_dir: Option<&str>) -> Result<PathBuf, PathError> {
    if let Some(raw) = override_dir {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PathError::EmptyPath);
        }
        return Ok(PathBuf::from(trimmed));
    }

    let data_dir = dirs::data_local_dir().ok_or(PathError::NoDataDir)?;
    Ok(data_dir.join("graphrun"))
}
