// src/core/job/runner.rs

//! Per-host workers. Each running host gets one spawned task that drives the
//! remote (or local) execution to completion and reports back on the shared
//! completion channel. Workers never touch scheduling state; the supervisor
//! is the only writer.
//!
//! A worker holds its completion until the supervisor acknowledges that the
//! journal records the outcome. Only then are the remote job files deleted,
//! so a supervisor crash in between still leaves a re-attachable job behind.

use crate::core::errors::RingleaderError;
use crate::core::topology::Host;
use crate::remote::local::LocalRemote;
use crate::remote::{self, ExecutionResult, SshOptions};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Transient transport failures are retried this many times; re-attachment
/// by job id makes the retry safe.
const CONNECT_ATTEMPTS: usize = 3;
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// What a worker executes.
#[derive(Debug, Clone)]
pub enum RunnerCommand {
    /// Stage the script on the host and run it under the job id.
    RemoteScript(PathBuf),
    /// Run a shell snippet locally, with `{}` replaced by the host ip.
    LocalShell(String),
}

/// One completion event. The supervisor sends `()` on `ack` once the
/// journal has recorded the transition.
pub struct RunnerEvent {
    pub host: Host,
    pub result: ExecutionResult,
    pub ack: oneshot::Sender<()>,
}

pub struct HostRunner {
    pub host: Host,
    pub command: RunnerCommand,
    pub job_id: String,
    pub timeout: Option<Duration>,
    pub env: HashMap<String, String>,
    pub ssh: SshOptions,
    pub output_directory: PathBuf,
    pub events: mpsc::UnboundedSender<RunnerEvent>,
}

impl HostRunner {
    /// Drives the host to completion. Transport errors become failed
    /// completion events after the retry budget, so the supervisor always
    /// observes exactly one event per dispatched host.
    pub async fn run(self) {
        let result = match self.execute().await {
            Ok(result) => result,
            Err(e) => {
                warn!("Execution on {} failed: {e}", self.host.fqdn);
                ExecutionResult {
                    command: String::new(),
                    status: -1,
                    out: String::new(),
                    err: e.to_string(),
                }
            }
        };

        if let Err(e) = save_output(&self.output_directory, &self.host, &result) {
            warn!("Could not save output for {}: {e}", self.host.fqdn);
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        let event = RunnerEvent {
            host: self.host.clone(),
            result,
            ack: ack_tx,
        };
        if self.events.send(event).is_err() {
            return;
        }

        // The journal now records this host; remote job files can go.
        if ack_rx.await.is_ok() {
            if let RunnerCommand::RemoteScript(_) = &self.command {
                self.remove_remote_job_files().await;
            }
        }
    }

    async fn execute(&self) -> Result<ExecutionResult, RingleaderError> {
        match &self.command {
            RunnerCommand::LocalShell(snippet) => {
                let rendered = snippet.replace("{}", &self.host.ip);
                LocalRemote::new(&self.host.ip)
                    .run_shell(&rendered, self.timeout, &self.env)
                    .await
            }
            RunnerCommand::RemoteScript(script) => {
                let mut last_err = None;
                for attempt in 1..=CONNECT_ATTEMPTS {
                    let mut conn = remote::connect(&self.host.ip, &self.ssh);
                    let res = conn
                        .run_job(script, &self.job_id, self.timeout, &self.env)
                        .await;
                    conn.close().await;
                    match res {
                        Ok(result) => return Ok(result),
                        Err(e @ RingleaderError::BadSshHost(_)) => {
                            debug!(
                                "Attempt {attempt}/{CONNECT_ATTEMPTS} on {} failed: {e}",
                                self.host.fqdn
                            );
                            last_err = Some(e);
                            if attempt < CONNECT_ATTEMPTS {
                                tokio::time::sleep(RETRY_DELAY).await;
                            }
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(last_err.unwrap_or_else(|| {
                    RingleaderError::BadSshHost(format!("no attempts made on {}", self.host.fqdn))
                }))
            }
        }
    }

    async fn remove_remote_job_files(&self) {
        let dir = format!("{}/{}", remote::REMOTE_JOBS_DIR, self.job_id);
        let mut conn = remote::connect(&self.host.ip, &self.ssh);
        if let Err(e) = conn.run(&["rm", "-rf", &dir]).await {
            debug!("Could not remove {dir} on {}: {e}", self.host.fqdn);
        }
        conn.close().await;
    }
}

/// Writes the per-host `out`, `err` and `status` files.
pub fn save_output(
    output_directory: &Path,
    host: &Host,
    result: &ExecutionResult,
) -> Result<(), RingleaderError> {
    let host_directory = output_directory.join(&host.fqdn);
    fs::create_dir_all(&host_directory)?;
    fs::write(host_directory.join("out"), &result.out)?;
    fs::write(host_directory.join("err"), &result.err)?;
    fs::write(host_directory.join("status"), result.status.to_string())?;
    Ok(())
}
