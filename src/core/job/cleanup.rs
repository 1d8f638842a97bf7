// src/core/job/cleanup.rs

//! Removal of stale job directories. A job directory is deleted when its
//! journal fails the reader policy: unparseable, wrong format version, or
//! older than the maximum age.

use crate::core::errors::RingleaderError;
use crate::core::job::journal;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Scans `jobs_dir` and deletes every job directory whose journal can no
/// longer be resumed. Returns the removed job ids.
pub fn cleanup_jobs(jobs_dir: &Path, max_days: i64) -> Result<Vec<String>, RingleaderError> {
    let mut removed = Vec::new();
    let entries = match fs::read_dir(jobs_dir) {
        Ok(entries) => entries,
        // A missing jobs directory just means nothing has run yet.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(removed),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let entry = entry?;
        let job_id = entry.file_name().to_string_lossy().into_owned();
        if journal::read(&entry.path(), max_days).is_ok() {
            continue;
        }
        info!("Removing job {job_id}");
        if let Err(e) = fs::remove_dir_all(entry.path()) {
            warn!("Could not remove job directory {job_id}: {e}");
        } else {
            removed.push(job_id);
        }
    }
    Ok(removed)
}
