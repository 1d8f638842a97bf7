// src/core/paths.rs

//! Well-known filesystem locations.

use std::path::PathBuf;

/// The operator's home directory; falls back to the working directory when
/// the environment is bare (containers, init systems).
pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn base_dir() -> PathBuf {
    home_dir().join(".ringleader")
}

/// Where job directories (journal + per-host output) live by default.
pub fn jobs_dir() -> PathBuf {
    base_dir().join("jobs")
}

/// Default output directory for a job id.
pub fn job_output_dir(job_id: &str) -> PathBuf {
    jobs_dir().join(job_id)
}

/// Where adjacency-graph caches live.
pub fn cache_dir() -> PathBuf {
    base_dir().join("cache")
}

/// Command-definition search path, highest priority first. The last entry
/// is the installed resources directory; no command files are shipped with
/// the tool itself.
pub fn command_dirs() -> Vec<PathBuf> {
    let builtin = std::env::var_os("RINGLEADER_COMMANDS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/usr/share/ringleader/commands"));
    vec![
        base_dir().join("commands"),
        PathBuf::from("/etc/ringleader/commands"),
        builtin,
    ]
}
