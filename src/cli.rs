// src/cli.rs

//! The command-line surface.
//!
//! The subcommand tree is assembled at startup: `continue`, `cleanup-jobs`
//! and `par` are fixed, and every discovered command definition contributes
//! one subcommand carrying its declared arguments. The dispatch functions
//! translate parsed arguments into `JobOptions` and drive the supervisor;
//! the process exit code is 0 on full success and 1 on failure or interrupt.

use crate::core::command::{self, Command as CommandDefinition};
use crate::core::errors::RingleaderError;
use crate::core::job::runner::RunnerCommand;
use crate::core::job::{Job, HostSelection, JobOptions, cleanup, journal};
use crate::core::paths;
use crate::core::strategy::Strategy;
use crate::remote::{SshLib, SshOptions};
use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Builds the full clap command tree.
pub fn build_cli(commands: &BTreeMap<String, CommandDefinition>) -> Command {
    let mut cli = Command::new("ringleader")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Topology-aware orchestration of shell commands across Cassandra clusters")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count)
                .global(true)
                .help("Increase command output verbosity"),
        );

    let continue_cmd = with_ssh_args(with_jmx_args(with_age_arg(with_common_args(
        Command::new("continue")
            .about("Continue a previously created job")
            .arg(Arg::new("job_id").required(true))
            .arg(
                Arg::new("retry_failed")
                    .long("retry-failed")
                    .action(ArgAction::SetTrue)
                    .help("Retry failed nodes"),
            ),
    ))));
    cli = cli.subcommand(continue_cmd);

    let cleanup_cmd = with_age_arg(
        Command::new("cleanup-jobs").about("Cleanup old finished jobs and exit"),
    );
    cli = cli.subcommand(cleanup_cmd);

    let par_cmd = with_ssh_args(with_jmx_args(with_common_args(with_strategy_args(
        with_destination_args(
            Command::new("par")
                .about("Run a local command once for each Cassandra host, '{}' replaced by its ip")
                .arg(Arg::new("command").required(true)),
        ),
    ))));
    cli = cli.subcommand(par_cmd);

    for (name, definition) in commands {
        // Fixed subcommands always win over a same-named command file.
        if matches!(name.as_str(), "continue" | "cleanup-jobs" | "par") {
            continue;
        }
        let mut sub = Command::new(name.clone());
        if let Some(description) = &definition.description {
            sub = sub.about(description.clone());
        }
        for argument in &definition.arguments {
            let mut arg = Arg::new(argument.name.clone())
                .long(argument.option.trim_start_matches('-').to_string())
                .help(argument.description.clone())
                .required(argument.required);
            if let Some(default) = &argument.default {
                arg = arg.default_value(default.clone());
            }
            sub = sub.arg(arg);
        }
        sub = with_ssh_args(with_jmx_args(with_common_args(with_strategy_args(
            with_destination_args(sub),
        ))));
        cli = cli.subcommand(sub);
    }
    cli
}

fn with_common_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("stop_after")
            .long("stop-after")
            .value_parser(clap::value_parser!(usize))
            .help("Stop the job after the specified number of hosts"),
    )
    .arg(
        Arg::new("output_directory")
            .long("output-directory")
            .value_parser(clap::value_parser!(PathBuf))
            .help("Output location for the job log"),
    )
    .arg(
        Arg::new("ignore_down_nodes")
            .long("ignore-down-nodes")
            .action(ArgAction::SetTrue)
            .help("Run the command even if there are down nodes in the cluster"),
    )
    .arg(
        Arg::new("enforced_job_id")
            .long("enforced-job-id")
            .help("Force the job id value to ease external tracking"),
    )
}

fn with_destination_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("seed_host")
            .long("seed-host")
            .action(ArgAction::Append)
            .help("One or more hosts to use as seeds for the cluster topology"),
    )
    .arg(
        Arg::new("host")
            .long("host")
            .action(ArgAction::Append)
            .help("One or more hosts to run the script on"),
    )
    .arg(
        Arg::new("host_file")
            .long("host-file")
            .value_parser(clap::value_parser!(PathBuf))
            .help("A file containing one or more hosts to run the script on (newline separated)"),
    )
    .arg(
        Arg::new("ssh_pause_time")
            .long("ssh-pause-time")
            .value_parser(clap::value_parser!(f64))
            .default_value("0.5")
            .help("Pause between establishing new ssh connections, to avoid connection storms"),
    )
    .arg(
        Arg::new("node_done_pause_time")
            .long("node-done-pause-time")
            .value_parser(clap::value_parser!(f64))
            .default_value("0.0")
            .help("Pause between a node finishing and the next node starting, in seconds"),
    )
    .arg(
        Arg::new("ssh_lib")
            .long("ssh-lib")
            .value_parser(["openssh", "ssh2"])
            .default_value("openssh")
            .help("SSH implementation to use for remote connections"),
    )
    .arg(
        Arg::new("hosts_variables")
            .long("hosts-variables")
            .value_parser(clap::value_parser!(PathBuf))
            .help("A JSON file with per-host variables: {\"host1\": {\"var1\": \"value\"}}"),
    )
}

fn with_strategy_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("max_concurrency")
            .long("max-concurrency")
            .short('j')
            .value_parser(clap::value_parser!(usize))
            .help("Maximum number of hosts to run the job on concurrently"),
    )
    .arg(
        Arg::new("timeout")
            .long("timeout")
            .value_parser(clap::value_parser!(u64))
            .help("Maximum number of seconds to run on one host before considering the job failed"),
    )
    .arg(
        Arg::new("strategy")
            .long("strategy")
            .value_parser(["one", "topology", "all"])
            .help("How aggressively to parallelize across the replica topology"),
    )
    .arg(
        Arg::new("cluster_parallel")
            .long("cluster-parallel")
            .action(ArgAction::SetTrue)
            .help("Run on all clusters in parallel"),
    )
    .arg(
        Arg::new("cluster_serial")
            .long("cluster-serial")
            .action(ArgAction::SetTrue)
            .conflicts_with("cluster_parallel")
            .help("Run on all clusters in serial"),
    )
    .arg(
        Arg::new("dc_parallel")
            .long("dc-parallel")
            .action(ArgAction::SetTrue)
            .help("Run on all data centers of a cluster in parallel"),
    )
    .arg(
        Arg::new("dc_serial")
            .long("dc-serial")
            .action(ArgAction::SetTrue)
            .conflicts_with("dc_parallel")
            .help("Run on all data centers of a cluster in serial"),
    )
    .arg(
        Arg::new("dc_filter")
            .long("dc-filter")
            .help("Only run on hosts belonging to the specified data center"),
    )
    .arg(
        Arg::new("key_space")
            .long("key-space")
            .alias("keyspace")
            .help("The keyspace to use for the replica graph. Uses all keyspaces by default"),
    )
}

fn with_ssh_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("ssh_username")
            .long("ssh-username")
            .help("Username for ssh connections"),
    )
    .arg(
        Arg::new("ssh_password")
            .long("ssh-password")
            .help("Password for ssh connections (ssh2 backend only)"),
    )
    .arg(
        Arg::new("ssh_identity_file")
            .long("ssh-identity-file")
            .value_parser(clap::value_parser!(PathBuf))
            .help("Identity file for ssh connections"),
    )
}

fn with_jmx_args(cmd: Command) -> Command {
    cmd.arg(Arg::new("jmx_username").long("jmx-username").help("JMX username"))
        .arg(Arg::new("jmx_password").long("jmx-password").help("JMX password"))
}

fn with_age_arg(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("max_job_age")
            .long("max-job-age")
            .value_parser(clap::value_parser!(i64))
            .default_value("7")
            .help("Maximum age in days of a job to resume"),
    )
}

/// Routes a parsed invocation to the right executor.
pub async fn dispatch(
    matches: &ArgMatches,
    commands: &BTreeMap<String, CommandDefinition>,
) -> Result<bool> {
    match matches.subcommand() {
        Some(("continue", sub)) => execute_continue(sub).await,
        Some(("cleanup-jobs", sub)) => execute_cleanup(sub),
        Some(("par", sub)) => execute_par(sub).await,
        Some((name, sub)) => {
            let definition = commands
                .get(name)
                .ok_or_else(|| RingleaderError::UnknownCommand(name.to_string()))?;
            execute_command(sub, definition).await
        }
        None => unreachable!("subcommand_required is set"),
    }
}

/// Runs one discovered command across the selected hosts.
pub async fn execute_command(
    matches: &ArgMatches,
    definition: &CommandDefinition,
) -> Result<bool> {
    let mut env = HashMap::new();
    for argument in &definition.arguments {
        if let Some(value) = matches.get_one::<String>(&argument.name) {
            env.insert(argument.name.clone(), value.clone());
        }
    }

    let job_id = resolve_job_id(matches)?;
    println!("Job id is {job_id}");
    println!("Running {}", definition.file.display());

    let options = build_job_options(
        matches,
        RunnerCommand::RemoteScript(definition.file.clone()),
        job_id,
        env,
        definition,
    )?;
    let mut job = Job::setup(options).await?;
    Ok(job.run().await?)
}

/// The parallel-local mode: runs a shell command locally once per host with
/// `{}` replaced by the host's ip.
pub async fn execute_par(matches: &ArgMatches) -> Result<bool> {
    let snippet = matches
        .get_one::<String>("command")
        .expect("command is required")
        .clone();
    let job_id = resolve_job_id(matches)?;
    println!("Job id is {job_id}");

    let placeholder = CommandDefinition {
        name: "par".to_string(),
        file: PathBuf::new(),
        strategy: None,
        cluster_parallel: None,
        dc_parallel: None,
        description: None,
        arguments: Vec::new(),
    };
    let options = build_job_options(
        matches,
        RunnerCommand::LocalShell(snippet),
        job_id,
        HashMap::new(),
        &placeholder,
    )?;
    let mut job = Job::setup(options).await?;
    Ok(job.run().await?)
}

/// Resumes a suspended job from its journal.
pub async fn execute_continue(matches: &ArgMatches) -> Result<bool> {
    let job_id = matches
        .get_one::<String>("job_id")
        .expect("job_id is required")
        .clone();
    let output_directory = matches
        .get_one::<PathBuf>("output_directory")
        .cloned()
        .unwrap_or_else(|| paths::job_output_dir(&job_id));
    let max_days = *matches.get_one::<i64>("max_job_age").expect("has default");

    let document = journal::read(&output_directory, max_days)?;
    let mut job = Job::resume(
        document,
        job_id,
        output_directory,
        matches.get_one::<usize>("stop_after").copied(),
        matches.get_flag("retry_failed"),
        matches.get_one::<String>("ssh_password").cloned(),
        matches.get_one::<String>("jmx_password").cloned(),
    )
    .await?;
    Ok(job.run().await?)
}

/// Deletes job directories whose journal can no longer be resumed.
pub fn execute_cleanup(matches: &ArgMatches) -> Result<bool> {
    let max_days = *matches.get_one::<i64>("max_job_age").expect("has default");
    let removed = cleanup::cleanup_jobs(&paths::jobs_dir(), max_days)?;
    for job_id in removed {
        println!("Removed job {job_id}");
    }
    Ok(true)
}

fn resolve_job_id(matches: &ArgMatches) -> Result<String, RingleaderError> {
    match matches.get_one::<String>("enforced_job_id") {
        Some(enforced) => {
            let parsed = Uuid::parse_str(enforced)?;
            if parsed.get_version_num() != 4 {
                return Err(RingleaderError::BadArgument(format!(
                    "enforced job id '{enforced}' is not a UUID v4"
                )));
            }
            Ok(enforced.clone())
        }
        None => Ok(Uuid::new_v4().to_string()),
    }
}

fn host_selection(matches: &ArgMatches) -> Result<HostSelection> {
    let seeds: Vec<String> = matches
        .get_many::<String>("seed_host")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();
    let hosts: Vec<String> = matches
        .get_many::<String>("host")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();
    let host_file = matches.get_one::<PathBuf>("host_file");

    let sources = [!seeds.is_empty(), !hosts.is_empty(), host_file.is_some()]
        .iter()
        .filter(|present| **present)
        .count();
    if sources == 0 {
        return Err(RingleaderError::NoHostsSpecified.into());
    }
    if sources > 1 {
        return Err(RingleaderError::BadArgument(
            "Exactly one of --seed-host, --host and --host-file must be used".to_string(),
        )
        .into());
    }

    if !seeds.is_empty() {
        return Ok(HostSelection::Seeds(seeds));
    }
    if let Some(path) = host_file {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("could not read host file {}", path.display()))?;
        let hosts: Vec<String> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if hosts.is_empty() {
            return Err(RingleaderError::NoHostsSpecified.into());
        }
        return Ok(HostSelection::Hosts(hosts));
    }
    Ok(HostSelection::Hosts(hosts))
}

fn build_job_options(
    matches: &ArgMatches,
    command: RunnerCommand,
    job_id: String,
    env: HashMap<String, String>,
    definition: &CommandDefinition,
) -> Result<JobOptions> {
    let strategy = matches
        .get_one::<String>("strategy")
        .map(|s| Strategy::from_str(s).expect("validated by clap"))
        .or(definition.strategy)
        .unwrap_or(Strategy::Topology);
    let cluster_parallel = flag_pair(matches, "cluster_parallel", "cluster_serial")
        .or(definition.cluster_parallel)
        .unwrap_or(false);
    let dc_parallel = flag_pair(matches, "dc_parallel", "dc_serial")
        .or(definition.dc_parallel)
        .unwrap_or(false);

    let hosts_variables = match matches.get_one::<PathBuf>("hosts_variables") {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("could not read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("could not parse {}", path.display()))?
        }
        None => HashMap::new(),
    };

    let ssh = SshOptions {
        username: matches.get_one::<String>("ssh_username").cloned(),
        password: matches.get_one::<String>("ssh_password").cloned(),
        identity_file: matches.get_one::<PathBuf>("ssh_identity_file").cloned(),
        lib: matches
            .get_one::<String>("ssh_lib")
            .map(|s| SshLib::from_str(s).expect("validated by clap"))
            .unwrap_or_default(),
    };

    Ok(JobOptions {
        selection: host_selection(matches)?,
        command,
        job_id,
        strategy,
        cluster_parallel,
        dc_parallel,
        max_concurrency: matches.get_one::<usize>("max_concurrency").copied(),
        timeout: matches.get_one::<u64>("timeout").copied().map(Duration::from_secs),
        env,
        stop_after: matches.get_one::<usize>("stop_after").copied(),
        key_space: matches.get_one::<String>("key_space").cloned(),
        output_directory: matches.get_one::<PathBuf>("output_directory").cloned(),
        ignore_down_nodes: matches.get_flag("ignore_down_nodes"),
        dc_filter: matches.get_one::<String>("dc_filter").cloned(),
        sleep_on_new_runner: Duration::from_secs_f64(
            *matches.get_one::<f64>("ssh_pause_time").expect("has default"),
        ),
        sleep_after_done: Duration::from_secs_f64(
            *matches
                .get_one::<f64>("node_done_pause_time")
                .expect("has default"),
        ),
        ssh,
        jmx_username: matches.get_one::<String>("jmx_username").cloned(),
        jmx_password: matches.get_one::<String>("jmx_password").cloned(),
        hosts_variables,
    })
}

/// Resolves a `--foo-parallel` / `--foo-serial` flag pair into an optional
/// boolean, `None` when neither was given.
fn flag_pair(matches: &ArgMatches, parallel: &str, serial: &str) -> Option<bool> {
    if matches.get_flag(parallel) {
        Some(true)
    } else if matches.get_flag(serial) {
        Some(false)
    } else {
        None
    }
}

/// Loads all command definitions for CLI construction.
pub fn discovered_commands() -> BTreeMap<String, CommandDefinition> {
    command::get_commands()
}
