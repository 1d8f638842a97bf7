// src/remote/ssh2.rs

//! Transport backed by libssh2 via the `ssh2` crate.
//!
//! Sessions are held open and reused across calls; a broken session is
//! dropped and re-established on the next call. libssh2 is a blocking
//! library, so every operation runs inside `block_in_place` to keep the
//! worker from starving the runtime.

use super::{
    ExecutionResult, REMOTE_JOB_WRAPPER, REMOTE_JOBS_DIR, Remote, SshOptions, render_env,
    shell_escape,
};
use crate::core::errors::RingleaderError;
use crate::remote::openssh::TIMEOUT_STATUS;
use ::ssh2::{OpenFlags, OpenType, Session};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::task::block_in_place;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const KEEPALIVE_INTERVAL_SECS: u32 = 5;

pub struct Ssh2Remote {
    hostname: String,
    options: SshOptions,
    session: Option<Session>,
}

impl Ssh2Remote {
    pub fn new(hostname: &str, options: SshOptions) -> Self {
        Self {
            hostname: hostname.to_string(),
            options,
            session: None,
        }
    }

    fn transport_err(&self, detail: impl std::fmt::Display) -> RingleaderError {
        RingleaderError::BadSshHost(format!("SSH failure on host {}: {detail}", self.hostname))
    }

    fn username(&self) -> String {
        self.options
            .username
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "root".to_string())
    }

    fn connect(&mut self) -> Result<(), RingleaderError> {
        if self.session.is_some() {
            return Ok(());
        }

        let addr: SocketAddr = format!("{}:22", self.hostname)
            .to_socket_addrs()
            .map_err(|e| self.transport_err(e))?
            .next()
            .ok_or_else(|| self.transport_err("address resolution returned nothing"))?;
        let tcp = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
            .map_err(|e| self.transport_err(e))?;

        let mut session = Session::new().map_err(|e| self.transport_err(e))?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| self.transport_err(e))?;

        let username = self.username();
        let auth = if let Some(identity) = &self.options.identity_file {
            session.userauth_pubkey_file(&username, None, identity, None)
        } else if let Some(password) = &self.options.password {
            session.userauth_password(&username, password)
        } else {
            session.userauth_agent(&username)
        };
        auth.map_err(|e| self.transport_err(format!("authentication failed: {e}")))?;

        session.set_keepalive(true, KEEPALIVE_INTERVAL_SECS);
        debug!("ssh2 session established to {}", self.hostname);
        self.session = Some(session);
        Ok(())
    }

    fn session(&mut self) -> Result<&Session, RingleaderError> {
        self.connect()?;
        Ok(self.session.as_ref().expect("session just connected"))
    }

    /// Runs one command over a fresh channel. Any channel-level failure
    /// invalidates the session so the next call reconnects.
    fn exec_blocking(&mut self, command: &str) -> Result<ExecutionResult, RingleaderError> {
        debug!("ssh2 {}: {}", self.hostname, command);
        let host = self.hostname.clone();
        let result = (|| {
            let session = self.session()?;
            let mut channel = session.channel_session().map_err(|e| {
                RingleaderError::BadSshHost(format!("channel to {host} failed: {e}"))
            })?;
            channel
                .exec(command)
                .map_err(|e| RingleaderError::BadSshHost(e.to_string()))?;

            let mut out = String::new();
            channel
                .read_to_string(&mut out)
                .map_err(|e| RingleaderError::BadSshHost(e.to_string()))?;
            let mut err = String::new();
            channel
                .stderr()
                .read_to_string(&mut err)
                .map_err(|e| RingleaderError::BadSshHost(e.to_string()))?;
            channel
                .wait_close()
                .map_err(|e| RingleaderError::BadSshHost(e.to_string()))?;
            let status = channel
                .exit_status()
                .map_err(|e| RingleaderError::BadSshHost(e.to_string()))?;
            Ok(ExecutionResult {
                command: command.to_string(),
                status,
                out,
                err,
            })
        })();
        if result.is_err() {
            self.session = None;
        }
        result
    }

    fn write_file_blocking(
        &mut self,
        remote_path: &str,
        data: &[u8],
    ) -> Result<(), RingleaderError> {
        let host = self.hostname.clone();
        let result = (|| {
            let session = self.session()?;
            let sftp = session
                .sftp()
                .map_err(|e| RingleaderError::BadSshHost(format!("sftp to {host} failed: {e}")))?;
            let mut file = sftp
                .open_mode(
                    Path::new(remote_path),
                    OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                    0o755,
                    OpenType::File,
                )
                .map_err(|e| RingleaderError::BadSshHost(e.to_string()))?;
            file.write_all(data)
                .map_err(|e| RingleaderError::BadSshHost(e.to_string()))?;
            Ok(())
        })();
        if result.is_err() {
            self.session = None;
        }
        result
    }

    fn read_file_blocking(&mut self, remote_path: &str) -> Result<String, RingleaderError> {
        let result = (|| {
            let session = self.session()?;
            let sftp = session
                .sftp()
                .map_err(|e| RingleaderError::BadSshHost(e.to_string()))?;
            let mut file = sftp
                .open(Path::new(remote_path))
                .map_err(|e| RingleaderError::BadSshHost(e.to_string()))?;
            let mut contents = String::new();
            file.read_to_string(&mut contents)
                .map_err(|e| RingleaderError::BadSshHost(e.to_string()))?;
            Ok(contents)
        })();
        if result.is_err() {
            self.session = None;
        }
        result
    }

    fn run_job_blocking(
        &mut self,
        script: &Path,
        job_id: &str,
        timeout: Option<Duration>,
        env: &HashMap<String, String>,
    ) -> Result<ExecutionResult, RingleaderError> {
        let dir = format!("{REMOTE_JOBS_DIR}/{job_id}");
        let mkdir = self.exec_blocking(&format!("mkdir -p {}", shell_escape(&dir)))?;
        if !mkdir.is_success() {
            return Err(self.transport_err(format!("could not create {dir}: {}", mkdir.err)));
        }

        let script_bytes = std::fs::read(script)?;
        self.write_file_blocking(&format!("{dir}/job"), &script_bytes)?;
        let wrapper = REMOTE_JOB_WRAPPER.replace("{env}", &render_env(env)?);
        self.write_file_blocking(&format!("{dir}/wrapper"), wrapper.as_bytes())?;

        // The per-command timeout applies to the wrapper run only; control
        // commands stay on the default (blocking) setting.
        let command = format!("cd {} && nohup ./wrapper", shell_escape(&dir));
        let started = Instant::now();
        if let Some(limit) = timeout {
            if let Some(session) = &self.session {
                session.set_timeout(limit.as_millis().min(u32::MAX as u128) as u32);
            }
        }
        let launch = self.exec_blocking(&command);
        if let Some(session) = &self.session {
            session.set_timeout(0);
        }
        match launch {
            Ok(_) => {}
            Err(e) => {
                if let Some(limit) = timeout {
                    if started.elapsed() >= limit {
                        return Ok(ExecutionResult {
                            command,
                            status: TIMEOUT_STATUS,
                            out: String::new(),
                            err: format!("timed out after {limit:?}"),
                        });
                    }
                }
                return Err(e);
            }
        }

        let out = self.read_file_blocking(&format!("{dir}/stdout"))?;
        let err = self.read_file_blocking(&format!("{dir}/stderr"))?;
        let status: i32 = self
            .read_file_blocking(&format!("{dir}/status"))?
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
}

#[async_trait]
impl Remote for Ssh2Remote {
    async fn run(&mut self, argv: &[&str]) -> Result<ExecutionResult, RingleaderError> {
        let command: Vec<String> = argv.iter().map(|s| shell_escape(s)).collect();
        block_in_place(|| self.exec_blocking(&command.join(" ")))
    }

    async fn run_job(
        &mut self,
        script: &Path,
        job_id: &str,
        timeout: Option<Duration>,
        env: &HashMap<String, String>,
    ) -> Result<ExecutionResult, RingleaderError> {
        block_in_place(|| self.run_job_blocking(script, job_id, timeout, env))
    }

    async fn close(&mut self) {
        self.session = None;
    }
}
