//! Filesystem layout for runs and history.
//!
//! All persistent state lives under a single data root:
//!
//! ```text
//! <root>/
//!   runs/                 per-run artifact directories
//!   eval_history.json     evaluation history store
//! ```
//!
//! The root resolves to `$AUTOREGRESS_DATA_DIR` when set (tests rely on this),
//! otherwise the platform per-user data directory.

use std::env;
use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::Result;

/// Environment variable overriding the data root.
pub const DATA_DIR_ENV: &str = "AUTOREGRESS_DATA_DIR";

/// Filename of the evaluation history store, relative to the data root.
pub const HISTORY_FILE: &str = "eval_history.json";

/// Resolve the data root without creating it.
pub fn data_root() -> PathBuf {
    if let Ok(dir) = env::var(DATA_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }
    match ProjectDirs::from("", "", "autoregress") {
        Some(dirs) => dirs.data_dir().to_path_buf(),
        // Headless environments without a home directory fall back to cwd.
        None => PathBuf::from(".").join("autoregress-data"),
    }
}

/// The directory holding per-run artifact directories, created on demand.
pub fn runs_dir() -> Result<PathBuf> {
    let dir = data_root().join("runs");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Path of the evaluation history store. The parent is created on demand; the
/// file itself may not exist yet.
pub fn history_path() -> Result<PathBuf> {
    let root = data_root();
    fs::create_dir_all(&root)?;
    Ok(root.join(HISTORY_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var tests mutate process state; keep them in one test so they never
    // race under the parallel test runner.
    #[test]
    fn test_data_root_override() {
        let dir = tempfile::tempdir().unwrap();
        unsafe { env::set_var(DATA_DIR_ENV, dir.path()) };
        assert_eq!(data_root(), dir.path());

        let runs = runs_dir().unwrap();
        assert_eq!(runs, dir.path().join("runs"));
        assert!(runs.is_dir());

        let history = history_path().unwrap();
        assert_eq!(history, dir.path().join(HISTORY_FILE));

        unsafe { env::set_var(DATA_DIR_ENV, "  ") };
        assert_ne!(data_root(), PathBuf::from("  "));

        unsafe { env::remove_var(DATA_DIR_ENV) };
    }
}
