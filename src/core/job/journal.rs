// src/core/job/journal.rs

//! The versioned on-disk representation of a job, used for resume and
//! cleanup. Rewritten after every observable progress transition as a
//! whole-file replacement (write to temp, rename), so a reader never sees a
//! partial document.
//!
//! The replica-adjacency graph is deliberately not persisted: ring topology
//! may have changed while the job was suspended, so it is re-derived from
//! the live cluster on resume. The SSH password is not persisted either; it
//! must be re-supplied on continue.

use crate::core::errors::RingleaderError;
use crate::core::progress::Progress;
use crate::core::strategy::Strategy;
use crate::core::topology::{Host, Topology};
use crate::remote::SshLib;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Bumped on any backwards-incompatible field change.
pub const FILE_FORMAT_VERSION: u32 = 1;

/// Default maximum age, in days, of a resumable job.
pub const DEFAULT_MAX_DAYS: i64 = 7;

const JOURNAL_FILE: &str = "job.json";

/// The scheduling state as persisted. Topologies and progress are stored as
/// host lists, sorted by position so the file is stable for a given state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDocument {
    pub strategy: Strategy,
    pub cluster_parallel: bool,
    pub dc_parallel: bool,
    pub max_concurrency: Option<usize>,
    pub ignore_down_nodes: bool,
    pub original_topology: Vec<Host>,
    pub current_topology: Vec<Host>,
    pub done: Vec<Host>,
    pub running: Vec<Host>,
    pub failed: Vec<Host>,
}

impl StateDocument {
    pub fn original_topology(&self) -> Topology {
        Topology::new(self.original_topology.iter().cloned())
    }

    pub fn current_topology(&self) -> Topology {
        Topology::new(self.current_topology.iter().cloned())
    }

    pub fn progress(&self) -> Progress {
        Progress {
            done: self.done.iter().cloned().collect(),
            running: self.running.iter().cloned().collect(),
            failed: self.failed.iter().cloned().collect(),
        }
    }
}

/// The complete journal document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalDocument {
    pub version: u32,
    pub creation_timestamp: i64,
    pub command: PathBuf,
    pub env: HashMap<String, String>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    pub key_space: Option<String>,
    #[serde(with = "humantime_serde")]
    pub sleep_on_new_runner: Duration,
    #[serde(with = "humantime_serde")]
    pub sleep_after_done: Duration,
    pub ssh_username: Option<String>,
    pub ssh_identity_file: Option<PathBuf>,
    pub ssh_lib: SshLib,
    pub jmx_username: Option<String>,
    pub hosts_variables: HashMap<String, HashMap<String, String>>,
    pub local: bool,
    pub state: StateDocument,
}

fn sorted_hosts(hosts: impl IntoIterator<Item = Host>) -> Vec<Host> {
    let mut hosts: Vec<Host> = hosts.into_iter().collect();
    hosts.sort_by_key(|h| h.position_key());
    hosts
}

impl StateDocument {
    pub fn from_parts(
        strategy: Strategy,
        cluster_parallel: bool,
        dc_parallel: bool,
        max_concurrency: Option<usize>,
        ignore_down_nodes: bool,
        original_topology: &Topology,
        current_topology: &Topology,
        progress: &Progress,
    ) -> Self {
        Self {
            strategy,
            cluster_parallel,
            dc_parallel,
            max_concurrency,
            ignore_down_nodes,
            original_topology: sorted_hosts(original_topology.iter().cloned()),
            current_topology: sorted_hosts(current_topology.iter().cloned()),
            done: sorted_hosts(progress.done.iter().cloned()),
            running: sorted_hosts(progress.running.iter().cloned()),
            failed: sorted_hosts(progress.failed.iter().cloned()),
        }
    }
}

pub fn journal_path(output_directory: &Path) -> PathBuf {
    output_directory.join(JOURNAL_FILE)
}

/// Writes the journal. Whole-file replacement: temp file, then rename.
pub fn write(document: &JournalDocument, output_directory: &Path) -> Result<(), RingleaderError> {
    fs::create_dir_all(output_directory)?;
    let path = journal_path(output_directory);
    let temp_path = output_directory.join(format!("{JOURNAL_FILE}.tmp.{}", rand::random::<u32>()));
    fs::write(&temp_path, serde_json::to_string_pretty(document)?)?;
    fs::rename(&temp_path, &path)?;
    debug!("Journal written to {}", path.display());
    Ok(())
}

/// Reads and validates a journal.
///
/// Fails with `BadFileFormatVersion` when the version integer is absent or
/// different from the current one, and with `FileTooOld` when the document
/// is older than `max_days` (override with `--max-job-age`).
pub fn read(output_directory: &Path, max_days: i64) -> Result<JournalDocument, RingleaderError> {
    let path = journal_path(output_directory);
    let raw = fs::read_to_string(&path)?;

    // The version gate must fire before full deserialization, so an old
    // document with renamed fields still reports the right error.
    let probe: serde_json::Value = serde_json::from_str(&raw)?;
    match probe.get("version").and_then(|v| v.as_u64()) {
        None => {
            return Err(RingleaderError::BadFileFormatVersion(format!(
                "Incompatible file format version, wanted {FILE_FORMAT_VERSION}"
            )));
        }
        Some(version) if version != FILE_FORMAT_VERSION as u64 => {
            return Err(RingleaderError::BadFileFormatVersion(format!(
                "Incompatible file format version, wanted {FILE_FORMAT_VERSION} but {} is of version {version}",
                path.display()
            )));
        }
        Some(_) => {}
    }

    let document: JournalDocument = serde_json::from_str(&raw)?;

    let age_days = (chrono::Utc::now().timestamp() - document.creation_timestamp) / 86_400;
    if age_days > max_days {
        return Err(RingleaderError::FileTooOld(format!(
            "Job created {age_days} days ago, which is more than the current maximum age of \
             {max_days}. Use --max-job-age {} if you really want to run this job.",
            age_days + 1
        )));
    }
    Ok(document)
}
