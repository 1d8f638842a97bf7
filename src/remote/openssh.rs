// src/remote/openssh.rs

//! Transport backed by the system OpenSSH binary.
//!
//! Every call spawns a fresh `ssh` process; connection reuse is left to the
//! operator's own ControlMaster configuration. Keepalive is requested via
//! `ServerAliveInterval` so a silent remote cannot stall a worker forever.
//! Password authentication is not possible with this backend; use the ssh2
//! backend for that.

use super::{
    ExecutionResult, REMOTE_JOB_WRAPPER, REMOTE_JOBS_DIR, Remote, SshOptions, render_env,
    shell_escape,
};
use crate::core::errors::RingleaderError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Exit status recorded when a job exceeds its per-host timeout.
pub(crate) const TIMEOUT_STATUS: i32 = 124;

/// The exit code the ssh client itself uses for connection-level failures.
const SSH_TRANSPORT_FAILURE: i32 = 255;

pub struct OpensshRemote {
    hostname: String,
    options: SshOptions,
}

impl OpensshRemote {
    pub fn new(hostname: &str, options: SshOptions) -> Self {
        Self {
            hostname: hostname.to_string(),
            options,
        }
    }

    fn target(&self) -> String {
        match &self.options.username {
            Some(user) => format!("{user}@{}", self.hostname),
            None => self.hostname.clone(),
        }
    }

    fn ssh_command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-C")
            .args(["-o", "BatchMode=yes"])
            .args(["-o", "StrictHostKeyChecking=accept-new"])
            .args(["-o", "ConnectTimeout=10"])
            .args(["-o", "ServerAliveInterval=5"]);
        if let Some(identity) = &self.options.identity_file {
            cmd.arg("-i").arg(identity);
        }
        cmd.arg(self.target());
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Runs one remote shell command, optionally feeding stdin and bounding
    /// the wall-clock time. A timeout yields a synthetic `TIMEOUT_STATUS`
    /// result rather than an error: the remote job keeps running and can be
    /// re-attached later.
    async fn exec(
        &self,
        command: &str,
        stdin: Option<&[u8]>,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, RingleaderError> {
        debug!("ssh {}: {}", self.hostname, command);
        let mut child = self
            .ssh_command()
            .arg(command)
            .spawn()
            .map_err(|e| RingleaderError::BadSshHost(format!("could not spawn ssh: {e}")))?;

        if let Some(data) = stdin {
            let mut handle = child.stdin.take().ok_or_else(|| {
                RingleaderError::BadSshHost("ssh stdin unavailable".to_string())
            })?;
            handle.write_all(data).await?;
        } else {
            drop(child.stdin.take());
        }

        let wait = child.wait_with_output();
        let output = match timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(output) => output?,
                Err(_) => {
                    return Ok(ExecutionResult {
                        command: command.to_string(),
                        status: TIMEOUT_STATUS,
                        out: String::new(),
                        err: format!("timed out after {limit:?}"),
                    });
                }
            },
            None => wait.await?,
        };

        let status = output.status.code().unwrap_or(-1);
        if status == SSH_TRANSPORT_FAILURE {
            return Err(RingleaderError::BadSshHost(format!(
                "SSH connection to host {} failed: {}",
                self.hostname,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(ExecutionResult {
            command: command.to_string(),
            status,
            out: String::from_utf8_lossy(&output.stdout).into_owned(),
            err: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn write_file(&self, remote_path: &str, data: &[u8]) -> Result<(), RingleaderError> {
        let escaped = shell_escape(remote_path);
        let result = self
            .exec(
                &format!("cat > {escaped} && chmod 755 {escaped}"),
                Some(data),
                None,
            )
            .await?;
        if !result.is_success() {
            return Err(RingleaderError::BadSshHost(format!(
                "failed to stage {} on {}: {}",
                remote_path, self.hostname, result.err
            )));
        }
        Ok(())
    }

    async fn read_file(&self, remote_path: &str) -> Result<String, RingleaderError> {
        let result = self
            .exec(&format!("cat {}", shell_escape(remote_path)), None, None)
            .await?;
        if !result.is_success() {
            return Err(RingleaderError::BadSshHost(format!(
                "failed to read {} on {}: {}",
                remote_path, self.hostname, result.err
            )));
        }
        Ok(result.out)
    }
}

#[async_trait]
impl Remote for OpensshRemote {
    async fn run(&mut self, argv: &[&str]) -> Result<ExecutionResult, RingleaderError> {
        let command: Vec<String> = argv.iter().map(|s| shell_escape(s)).collect();
        self.exec(&command.join(" "), None, None).await
    }

    async fn run_job(
        &mut self,
        script: &Path,
        job_id: &str,
        timeout: Option<Duration>,
        env: &HashMap<String, String>,
    ) -> Result<ExecutionResult, RingleaderError> {
        let dir = format!("{REMOTE_JOBS_DIR}/{job_id}");
        let mkdir = self
            .exec(&format!("mkdir -p {}", shell_escape(&dir)), None, None)
            .await?;
        if !mkdir.is_success() {
            return Err(RingleaderError::BadSshHost(format!(
                "could not create {} on {}: {}",
                dir, self.hostname, mkdir.err
            )));
        }

        let script_bytes = tokio::fs::read(script).await?;
        self.write_file(&format!("{dir}/job"), &script_bytes).await?;

        let wrapper = REMOTE_JOB_WRAPPER.replace("{env}", &render_env(env)?);
        self.write_file(&format!("{dir}/wrapper"), wrapper.as_bytes())
            .await?;

        let command = format!("cd {} && nohup ./wrapper", shell_escape(&dir));
        let launch = self.exec(&command, None, timeout).await?;
        if launch.status == TIMEOUT_STATUS {
            return Ok(launch);
        }

        let out = self.read_file(&format!("{dir}/stdout")).await?;
        let err = self.read_file(&format!("{dir}/stderr")).await?;
        let status: i32 = self
            .read_file(&format!("{dir}/status"))
            .await?
            .trim()
            .parse()
            .map_err(|e| {
                RingleaderError::Internal(format!(
                    "unparseable job status from {}: {e}",
                    self.hostname
                ))
            })?;
        Ok(ExecutionResult {
            command,
            status,
            out,
            err,
        })
    }

    async fn close(&mut self) {}
}
