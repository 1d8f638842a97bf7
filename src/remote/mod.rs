// src/remote/mod.rs

//! Remote execution transports.
//!
//! Everything the supervisor needs from a transport is captured by the
//! `Remote` trait: run a short control command, or run a long-lived job
//! identified by a job id. Jobs are idempotent to re-attach: the remote
//! side keys everything by the job id, and a reconnecting transport reads
//! the recorded status/stdout/stderr instead of relaunching.
//!
//! Two SSH backends are provided (the system OpenSSH binary and libssh2),
//! plus a local backend for the parallel-local mode.

pub mod local;
pub mod openssh;
pub mod ssh2;

use crate::core::errors::RingleaderError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum_macros::{Display, EnumString};

/// The idempotent wrapper staged next to every remote job. `{env}` is
/// substituted with the job's environment assignments before upload.
pub(crate) const REMOTE_JOB_WRAPPER: &str = include_str!("remote_job.sh");

/// Root of the per-job staging directories on the remote side.
pub(crate) const REMOTE_JOBS_DIR: &str = ".ringleader/remote-jobs";

/// Characters that survive a shell unquoted. Anything else gets wrapped in
/// single quotes.
static SHELL_SAFE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9|_./=-]+$").unwrap());

/// Valid environment variable names.
static ENV_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").unwrap());

/// The outcome of one remote (or local) execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub command: String,
    pub status: i32,
    pub out: String,
    pub err: String,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

/// Which SSH implementation backs remote sessions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, Default,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SshLib {
    /// Drive the system `ssh` binary. Key and agent auth only.
    #[default]
    Openssh,
    /// libssh2 sessions in-process; supports password auth.
    Ssh2,
}

/// Connection options shared by the SSH backends.
#[derive(Debug, Clone, Default)]
pub struct SshOptions {
    pub username: Option<String>,
    pub password: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub lib: SshLib,
}

/// A transport session against one host. Implementations connect lazily and
/// may transparently reconnect a broken session on the next call.
#[async_trait]
pub trait Remote: Send {
    /// Runs a short command, e.g. a nodetool probe, and captures its output.
    async fn run(&mut self, argv: &[&str]) -> Result<ExecutionResult, RingleaderError>;

    /// Stages and runs a job script to completion under the given job id,
    /// with the given environment. Re-invocations with the same job id
    /// re-attach instead of relaunching.
    async fn run_job(
        &mut self,
        script: &Path,
        job_id: &str,
        timeout: Option<Duration>,
        env: &HashMap<String, String>,
    ) -> Result<ExecutionResult, RingleaderError>;

    async fn close(&mut self);
}

/// Opens a transport for `ip` according to the selected backend. No network
/// traffic happens until the first call.
pub fn connect(ip: &str, options: &SshOptions) -> Box<dyn Remote> {
    match options.lib {
        SshLib::Openssh => Box::new(openssh::OpensshRemote::new(ip, options.clone())),
        SshLib::Ssh2 => Box::new(ssh2::Ssh2Remote::new(ip, options.clone())),
    }
}

/// Quotes a single shell word the way a careful operator would.
pub fn shell_escape(input: &str) -> String {
    if !input.is_empty() && SHELL_SAFE_RE.is_match(input) {
        input.to_string()
    } else {
        format!("'{}'", input.replace('\'', r"'\''"))
    }
}

/// Renders an environment map as `KEY=value` assignments, validating every
/// name. Keys are sorted for reproducible wrapper scripts.
pub fn render_env(env: &HashMap<String, String>) -> Result<String, RingleaderError> {
    let mut entries: Vec<(&String, &String)> = env.iter().collect();
    entries.sort();
    let mut parts = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        if !ENV_NAME_RE.is_match(key) {
            return Err(RingleaderError::BadEnvironmentVariable(key.clone()));
        }
        parts.push(format!("{}={}", key, shell_escape(value)));
    }
    Ok(parts.join(" "))
}
