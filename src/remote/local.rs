// src/remote/local.rs

//! Local-execution transport for the parallel-local mode: the same
//! capability interface as the SSH backends, but every command runs on the
//! operator's machine. Unlike the remote backends, re-running a job here
//! runs it again; there is no remote state to re-attach to.

use super::{ExecutionResult, Remote};
use crate::core::errors::RingleaderError;
use crate::remote::openssh::TIMEOUT_STATUS;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

pub struct LocalRemote {
    hostname: String,
}

impl LocalRemote {
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
        }
    }

    /// Runs a shell snippet locally with the given environment, bounded by
    /// `timeout`. Used by the parallel-local mode after `{}` substitution.
    pub async fn run_shell(
        &self,
        snippet: &str,
        timeout: Option<Duration>,
        env: &HashMap<String, String>,
    ) -> Result<ExecutionResult, RingleaderError> {
        let mut command = Command::new("sh");
        command.arg("-c").arg(snippet).envs(env);
        self.run_command(command, snippet.to_string(), timeout).await
    }

    async fn run_command(
        &self,
        mut command: Command,
        rendered: String,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, RingleaderError> {
        debug!("local ({}): {}", self.hostname, rendered);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let child = command.spawn()?;

        let wait = child.wait_with_output();
        let output = match timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(output) => output?,
                Err(_) => {
                    return Ok(ExecutionResult {
                        command: rendered,
                        status: TIMEOUT_STATUS,
                        out: String::new(),
                        err: format!("timed out after {limit:?}"),
                    });
                }
            },
            None => wait.await?,
        };

        Ok(ExecutionResult {
            command: rendered,
            status: output.status.code().unwrap_or(-1),
            out: String::from_utf8_lossy(&output.stdout).into_owned(),
            err: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[async_trait]
impl Remote for LocalRemote {
    async fn run(&mut self, argv: &[&str]) -> Result<ExecutionResult, RingleaderError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| RingleaderError::BadArgument("empty command".to_string()))?;
        let mut command = Command::new(*program);
        command.args(args);
        self.run_command(command, argv.join(" "), None).await
    }

    async fn run_job(
        &mut self,
        script: &Path,
        _job_id: &str,
        timeout: Option<Duration>,
        env: &HashMap<String, String>,
    ) -> Result<ExecutionResult, RingleaderError> {
        let mut command = Command::new(script);
        command.envs(env);
        self.run_command(command, script.display().to_string(), timeout)
            .await
    }

    async fn close(&mut self) {}
}
