// src/core/job/mod.rs

//! The job supervisor: the event loop that wires scheduling, execution,
//! health checking and journaling together.
//!
//! The supervisor runs as a single control task. Per-host workers run as
//! spawned tasks and report on one completion channel; only the supervisor
//! mutates scheduling state. Dispatch order is fully determined by the
//! strategy function; completion order is not guaranteed, but all ready
//! completions are drained and observed as one batch before any new
//! dispatch decision.

pub mod cleanup;
pub mod journal;
pub mod printer;
pub mod runner;
pub mod signal;

use crate::core::errors::RingleaderError;
use crate::core::job::journal::{JournalDocument, StateDocument};
use crate::core::job::printer::TerminalWriter;
use crate::core::job::runner::{HostRunner, RunnerCommand, RunnerEvent};
use crate::core::job::signal::InterruptHandle;
use crate::core::paths;
use crate::core::probe::HealthProbe;
use crate::core::state::State;
use crate::core::strategy::Strategy;
use crate::core::topology::Host;
use crate::remote::{ExecutionResult, SshOptions};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How often cluster health is re-polled while waiting for nodes to return.
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Which hosts a job targets.
pub enum HostSelection {
    /// Seeds: every seed contributes its entire cluster.
    Seeds(Vec<String>),
    /// An explicit host list: clusters are discovered through the named
    /// hosts, but only the named hosts run.
    Hosts(Vec<String>),
}

/// Everything the CLI hands the supervisor for a fresh job.
pub struct JobOptions {
    pub selection: HostSelection,
    pub command: RunnerCommand,
    pub job_id: String,
    pub strategy: Strategy,
    pub cluster_parallel: bool,
    pub dc_parallel: bool,
    pub max_concurrency: Option<usize>,
    pub timeout: Option<Duration>,
    pub env: HashMap<String, String>,
    pub stop_after: Option<usize>,
    pub key_space: Option<String>,
    pub output_directory: Option<PathBuf>,
    pub ignore_down_nodes: bool,
    pub dc_filter: Option<String>,
    pub sleep_on_new_runner: Duration,
    pub sleep_after_done: Duration,
    pub ssh: SshOptions,
    pub jmx_username: Option<String>,
    pub jmx_password: Option<String>,
    pub hosts_variables: HashMap<String, HashMap<String, String>>,
}

pub struct Job {
    state: State,
    command: RunnerCommand,
    job_id: String,
    timeout: Option<Duration>,
    env: HashMap<String, String>,
    key_space: Option<String>,
    output_directory: PathBuf,
    sleep_on_new_runner: Duration,
    sleep_after_done: Duration,
    ssh: SshOptions,
    jmx_username: Option<String>,
    hosts_variables: HashMap<String, HashMap<String, String>>,
    creation_timestamp: i64,
    probe: HealthProbe,
    events_tx: mpsc::UnboundedSender<RunnerEvent>,
    events_rx: mpsc::UnboundedReceiver<RunnerEvent>,
    errors: Vec<(Host, ExecutionResult)>,
    do_loop: bool,
    interrupt: InterruptHandle,
    writer: TerminalWriter,
}

impl Job {
    /// Builds the initial state for a fresh job: discovers topologies,
    /// derives the adjacency graph when needed, creates the output
    /// directory, installs the interrupt handler and journals.
    pub async fn setup(options: JobOptions) -> Result<Job, RingleaderError> {
        let mut writer = TerminalWriter::new(true);
        writer.msg("Starting setup");
        writer.msg(&format!("Strategy: {}", options.strategy));
        writer.msg(&format!("DC parallel: {}", options.dc_parallel));
        writer.msg(&format!("Cluster parallel: {}", options.cluster_parallel));

        let mut probe = HealthProbe::new(
            options.ssh.clone(),
            options.jmx_username.clone(),
            options.jmx_password.clone(),
        );

        writer.msg("Loading cluster topology");
        let (discovery, named_ips) = match &options.selection {
            HostSelection::Seeds(seeds) if !seeds.is_empty() => {
                (probe.discover(seeds).await?, None)
            }
            HostSelection::Hosts(hosts) if !hosts.is_empty() => {
                let (discovery, named_ips) = probe.discover_hosts(hosts).await?;
                (discovery, Some(named_ips))
            }
            _ => return Err(RingleaderError::NoHostsSpecified),
        };
        writer.msg("Done loading cluster topology");

        let current_topology = discovery.topology.clone();
        let mut original_topology = match named_ips {
            Some(named_ips) => current_topology
                .iter()
                .filter(|h| named_ips.contains(&h.ip))
                .cloned()
                .collect(),
            None => current_topology.clone(),
        };
        if let Some(dc) = &options.dc_filter {
            original_topology = original_topology.with_dc_filter(dc);
        }

        debug!("Run on hosts {original_topology}");
        debug!("in topology {current_topology}");

        let adjacency = if options.strategy == Strategy::Topology {
            writer.msg("Generating replica-adjacency graph");
            let graph = probe
                .get_adjacency(
                    &current_topology,
                    options.key_space.as_deref(),
                    &discovery.cache_key,
                    &paths::cache_dir(),
                )
                .await?;
            writer.msg("Done generating replica-adjacency graph");
            Some(graph)
        } else {
            writer.msg("Skipping replica-adjacency graph because of selected strategy");
            None
        };

        let state = State::new(
            original_topology,
            options.strategy,
            adjacency,
            options.cluster_parallel,
            options.dc_parallel,
            options.max_concurrency,
            Some(current_topology),
            options.stop_after,
            options.ignore_down_nodes,
        );

        let output_directory = options
            .output_directory
            .unwrap_or_else(|| paths::job_output_dir(&options.job_id));
        std::fs::create_dir_all(&output_directory)?;

        let interrupt = InterruptHandle::new();
        interrupt.install(&options.job_id, writer.ansi());

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut job = Job {
            state,
            command: options.command,
            job_id: options.job_id,
            timeout: options.timeout,
            env: options.env,
            key_space: options.key_space,
            output_directory,
            sleep_on_new_runner: options.sleep_on_new_runner,
            sleep_after_done: options.sleep_after_done,
            ssh: options.ssh,
            jmx_username: options.jmx_username,
            hosts_variables: options.hosts_variables,
            creation_timestamp: chrono::Utc::now().timestamp(),
            probe,
            events_tx,
            events_rx,
            errors: Vec::new(),
            do_loop: false,
            interrupt,
            writer,
        };
        job.write_journal()?;
        job.writer.msg("Setup done");
        Ok(job)
    }

    /// Rebuilds a job from its journal: topologies are refreshed from the
    /// live cluster, the adjacency graph is re-derived, and a worker is
    /// re-attached to every host the journal still lists as running.
    #[allow(clippy::too_many_arguments)]
    pub async fn resume(
        document: JournalDocument,
        job_id: String,
        output_directory: PathBuf,
        stop_after: Option<usize>,
        retry_failed: bool,
        ssh_password: Option<String>,
        jmx_password: Option<String>,
    ) -> Result<Job, RingleaderError> {
        let mut writer = TerminalWriter::new(true);
        writer.msg(&format!("Resuming job {job_id}"));
        writer.msg(&format!("Running {}", document.command.display()));

        let ssh = SshOptions {
            username: document.ssh_username.clone(),
            password: ssh_password,
            identity_file: document.ssh_identity_file.clone(),
            lib: document.ssh_lib,
        };
        let mut probe = HealthProbe::new(ssh.clone(), document.jmx_username.clone(), jmx_password);

        let original_topology = document.state.original_topology();
        let journaled_current = document.state.current_topology();
        let mut progress = document.state.progress();
        if retry_failed {
            progress = progress.with_failed_cleared();
        }

        // Re-observe every cluster; ring and membership may have moved while
        // the job was suspended.
        let mut current_topology = crate::core::topology::Topology::default();
        let mut schema_versions = std::collections::BTreeSet::new();
        let mut topology_hashes = std::collections::BTreeSet::new();
        for cluster in original_topology.get_clusters() {
            let mut candidates: Vec<String> = journaled_current
                .with_cluster(&cluster)
                .get_up()
                .iter()
                .map(|h| h.ip.clone())
                .collect();
            candidates.sort();
            let snapshot = probe.get_cluster_topology(&candidates).await?;
            schema_versions.insert(snapshot.schema_version.clone());
            topology_hashes.insert(snapshot.topology.hash());
            current_topology = current_topology.union(&snapshot.topology);
        }
        let cache_key = crate::core::adjacency::CacheKey {
            schema_versions,
            topology_hashes,
        };

        let adjacency = if document.state.strategy == Strategy::Topology {
            Some(
                probe
                    .get_adjacency(
                        &current_topology,
                        document.key_space.as_deref(),
                        &cache_key,
                        &paths::cache_dir(),
                    )
                    .await?,
            )
        } else {
            None
        };

        let state = State {
            original_topology,
            current_topology,
            strategy: document.state.strategy,
            adjacency,
            progress,
            cluster_parallel: document.state.cluster_parallel,
            dc_parallel: document.state.dc_parallel,
            max_concurrency: document.state.max_concurrency,
            stop_after,
            ignore_down_nodes: document.state.ignore_down_nodes,
        };

        let interrupt = InterruptHandle::new();
        interrupt.install(&job_id, writer.ansi());

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut job = Job {
            state,
            command: if document.local {
                RunnerCommand::LocalShell(document.command.to_string_lossy().into_owned())
            } else {
                RunnerCommand::RemoteScript(document.command.clone())
            },
            job_id,
            timeout: document.timeout,
            env: document.env.clone(),
            key_space: document.key_space.clone(),
            output_directory,
            sleep_on_new_runner: document.sleep_on_new_runner,
            sleep_after_done: document.sleep_after_done,
            ssh,
            jmx_username: document.jmx_username.clone(),
            hosts_variables: document.hosts_variables.clone(),
            creation_timestamp: document.creation_timestamp,
            probe,
            events_tx,
            events_rx,
            errors: Vec::new(),
            do_loop: false,
            interrupt,
            writer,
        };

        // Re-attach to in-flight work. The remote side is idempotent: a
        // reconnecting worker reads the existing status instead of
        // relaunching.
        let running: Vec<Host> = job.state.progress.running.iter().cloned().collect();
        for host in running {
            debug!("Resume on host {}", host.fqdn);
            job.spawn_runner(host).await;
        }
        Ok(job)
    }

    /// The main event loop. Returns true when every targeted host finished
    /// successfully (or the stop-after budget was met without errors).
    pub async fn run(&mut self) -> Result<bool, RingleaderError> {
        self.do_loop = true;
        self.write_journal()?;

        if !self.state.is_healthy() {
            let down: Vec<String> = self
                .state
                .current_topology
                .get_down()
                .iter()
                .map(|h| h.fqdn.clone())
                .collect();
            return Err(RingleaderError::HostIsDown(format!(
                "Can't run job because hosts are down: {}",
                down.join(", ")
            )));
        }

        while self.do_loop {
            self.schedule_all_runnable_jobs().await?;
            if self.state.is_done() {
                self.do_loop = false;
            }
            self.wait_for_any_job().await?;
        }

        self.wait_for_all_jobs().await?;
        self.print_progress();
        self.write_journal()?;
        let success = self.print_outcome();
        self.probe.close().await;
        Ok(success)
    }

    /// Dispatch phase: pick hosts until the strategy returns none. Hosts
    /// that are known down while `ignore_down_nodes` is set are recorded as
    /// done without dispatching.
    async fn schedule_all_runnable_jobs(&mut self) -> Result<(), RingleaderError> {
        loop {
            let next = self.state.find_next_host()?;
            let Some(host) = next else {
                if self.state.progress.running.is_empty() {
                    self.do_loop = false;
                }
                break;
            };
            if !host.is_up && self.state.ignore_down_nodes {
                self.state = self.state.with_done(host);
            } else {
                self.state = self.state.with_running(host.clone());
                self.spawn_runner(host).await;
            }
            self.write_journal()?;
            self.print_progress();
        }
        Ok(())
    }

    async fn spawn_runner(&mut self, host: Host) {
        debug!("Running on host {}", host.fqdn);
        let runner = HostRunner {
            env: self.host_env(&host),
            host,
            command: self.command.clone(),
            job_id: self.job_id.clone(),
            timeout: self.timeout,
            ssh: self.ssh.clone(),
            output_directory: self.output_directory.clone(),
            events: self.events_tx.clone(),
        };
        tokio::spawn(runner.run());
        // Pacing between session starts avoids connection storms.
        if !self.sleep_on_new_runner.is_zero() {
            tokio::time::sleep(self.sleep_on_new_runner).await;
        }
    }

    /// Await phase: block for one completion (bounded by the per-host
    /// timeout when one is set), drain everything else that is ready, then
    /// re-validate cluster health before the next dispatch round.
    async fn wait_for_any_job(&mut self) -> Result<(), RingleaderError> {
        if !self.do_loop {
            return Ok(());
        }
        let first = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.events_rx.recv()).await {
                Ok(event) => event,
                Err(_) => {
                    warn!(
                        "No completion event within {limit:?}; still waiting on {} host(s)",
                        self.state.progress.running.len()
                    );
                    return Ok(());
                }
            },
            None => self.events_rx.recv().await,
        };
        let first = first.ok_or_else(|| {
            RingleaderError::Internal("completion channel closed unexpectedly".to_string())
        })?;

        let mut batch = vec![first];
        while let Ok(event) = self.events_rx.try_recv() {
            batch.push(event);
        }
        let returned: Vec<Host> = batch.iter().map(|e| e.host.clone()).collect();
        self.handle_finished_jobs(batch).await?;
        self.wait_for_node_to_return(&returned).await?;
        Ok(())
    }

    /// Graceful drain: after a failure stops the loop, the remaining
    /// in-flight hosts are still awaited to completion, never killed.
    async fn wait_for_all_jobs(&mut self) -> Result<(), RingleaderError> {
        while !self.state.progress.running.is_empty() {
            let event = self.events_rx.recv().await.ok_or_else(|| {
                RingleaderError::Internal("completion channel closed unexpectedly".to_string())
            })?;
            let mut batch = vec![event];
            while let Ok(event) = self.events_rx.try_recv() {
                batch.push(event);
            }
            self.handle_finished_jobs(batch).await?;
        }
        Ok(())
    }

    /// Moves each returned host to done or failed, journals, then acks the
    /// workers so they may delete their remote job files.
    async fn handle_finished_jobs(
        &mut self,
        batch: Vec<RunnerEvent>,
    ) -> Result<(), RingleaderError> {
        debug!("Processing {} finished job(s)", batch.len());
        for event in &batch {
            if event.result.is_success() {
                self.state = self.state.with_done(event.host.clone());
                info!("Host {} finished successfully", event.host.fqdn);
                if !event.result.out.is_empty() {
                    info!("stdout: {}", event.result.out.trim_end());
                }
                if !event.result.err.is_empty() {
                    info!("stderr: {}", event.result.err.trim_end());
                }
                if !self.sleep_after_done.is_zero() {
                    debug!("Sleeping {:?}...", self.sleep_after_done);
                    tokio::time::sleep(self.sleep_after_done).await;
                }
            } else {
                self.state = self.state.with_failed(event.host.clone());
                self.errors.push((event.host.clone(), event.result.clone()));
                self.writer.msg(&format!("Failure on host {}", event.host.fqdn));
                if !event.result.out.is_empty() {
                    self.writer.msg(&format!("stdout: {}", event.result.out.trim_end()));
                }
                if !event.result.err.is_empty() {
                    self.writer.msg(&format!("stderr: {}", event.result.err.trim_end()));
                }
                self.do_loop = false;
            }
        }
        self.write_journal()?;
        for event in batch {
            let _ = event.ack.send(());
        }
        Ok(())
    }

    /// Health re-check: refresh the current topology (skipping the hosts
    /// that just returned, they may still be restarting) and poll until the
    /// state is healthy again. An unreachable probe host is treated as
    /// "possibly rebooting" and polling continues.
    async fn wait_for_node_to_return(&mut self, skip: &[Host]) -> Result<(), RingleaderError> {
        loop {
            match self.probe.refresh_topology(&self.state, skip).await {
                Ok(new_topology) => {
                    self.state = self.state.with_topology(new_topology);
                    if self.state.is_healthy() {
                        return Ok(());
                    }
                }
                Err(RingleaderError::BadSshHost(e)) | Err(RingleaderError::HostIsDown(e)) => {
                    debug!("Health probe failed, instance down? {e}");
                }
                Err(e) => return Err(e),
            }
            self.print_progress();
            tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
        }
    }

    fn host_env(&self, host: &Host) -> HashMap<String, String> {
        let mut env = self.env.clone();
        if let Some(vars) = self.hosts_variables.get(&host.fqdn) {
            env.extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        env
    }

    fn print_progress(&mut self) {
        let frame = printer::render_progress(
            &self.state.original_topology,
            &self.state.progress,
            &self.state.current_topology.get_down(),
        );
        self.writer.frame(&frame);
    }

    fn print_outcome(&mut self) -> bool {
        let progress = &self.state.progress;
        if self.state.is_done() && self.errors.is_empty() {
            if self.state.stop_after == Some(progress.done.len()) {
                let hint =
                    printer::emph(&format!("ringleader continue {}", self.job_id), self.writer.ansi());
                self.writer.msg(&format!(
                    "Job {} successfully ran on {} hosts.\nTo finish the job, run {hint}",
                    self.job_id,
                    progress.done.len()
                ));
            }
            self.writer
                .msg(&format!("Job {} finished successfully", self.job_id));
            true
        } else {
            let not_started =
                self.state.original_topology.len() - progress.done.len() - progress.failed.len();
            self.writer.msg(&format!(
                "Job {} finished with errors.\n\
                 {} nodes finished successfully\n\
                 {} nodes had errors\n\
                 {} nodes didn't start executing",
                self.job_id,
                progress.done.len(),
                progress.failed.len(),
                not_started
            ));
            false
        }
    }

    fn write_journal(&mut self) -> Result<(), RingleaderError> {
        let document = self.to_document();
        journal::write(&document, &self.output_directory)?;
        self.interrupt
            .update(document, self.output_directory.clone());
        Ok(())
    }

    fn to_document(&self) -> JournalDocument {
        let (command, local) = match &self.command {
            RunnerCommand::RemoteScript(path) => (path.clone(), false),
            RunnerCommand::LocalShell(snippet) => (PathBuf::from(snippet), true),
        };
        JournalDocument {
            version: journal::FILE_FORMAT_VERSION,
            creation_timestamp: self.creation_timestamp,
            command,
            env: self.env.clone(),
            timeout: self.timeout,
            key_space: self.key_space.clone(),
            sleep_on_new_runner: self.sleep_on_new_runner,
            sleep_after_done: self.sleep_after_done,
            ssh_username: self.ssh.username.clone(),
            ssh_identity_file: self.ssh.identity_file.clone(),
            ssh_lib: self.ssh.lib,
            jmx_username: self.jmx_username.clone(),
            hosts_variables: self.hosts_variables.clone(),
            local,
            state: StateDocument::from_parts(
                self.state.strategy,
                self.state.cluster_parallel,
                self.state.dc_parallel,
                self.state.max_concurrency,
                self.state.ignore_down_nodes,
                &self.state.original_topology,
                &self.state.current_topology,
                &self.state.progress,
            ),
        }
    }
}
