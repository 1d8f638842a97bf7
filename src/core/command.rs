// src/core/command.rs

//! Locating and parsing command definitions.
//!
//! A command is a shell-executable file whose leading comment block declares
//! properties, one per line:
//!
//! ```text
//! #!/usr/bin/env bash
//! # C* cluster-parallel: true
//! # C* dc-parallel: false
//! # C* strategy: topology
//! # C* description: Upgrade one node
//! # C* argument: {"option":"--snapshot-name", "name":"SNAPSHOT_NAME", "description":"snapshot name", "default":"preupgrade"}
//! ```
//!
//! Parsing stops at the first non-comment line. Argument names become
//! environment variables on the remote side, so they are restricted to
//! alphanumerics and underscore.

use crate::core::errors::RingleaderError;
use crate::core::paths;
use crate::core::strategy::Strategy;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

static PROPERTY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^# C\*\s*([^\s:]+)\s*:\s*(.*?)\s*$").unwrap());
static ENV_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").unwrap());

/// One declared argument of a command. `name` doubles as the environment
/// variable under which the value reaches the script.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CommandArgument {
    pub option: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<String>,
}

/// A parsed command definition.
#[derive(Debug, Clone)]
pub struct Command {
    pub name: String,
    pub file: PathBuf,
    pub strategy: Option<Strategy>,
    pub cluster_parallel: Option<bool>,
    pub dc_parallel: Option<bool>,
    pub description: Option<String>,
    pub arguments: Vec<CommandArgument>,
}

/// Parses a definition file's header block.
pub fn parse(name: &str, file: &Path, definition: &str) -> Result<Command, RingleaderError> {
    let mut command = Command {
        name: name.to_string(),
        file: file.to_path_buf(),
        strategy: None,
        cluster_parallel: None,
        dc_parallel: None,
        description: None,
        arguments: Vec::new(),
    };

    for line in definition.lines() {
        if !line.starts_with('#') {
            break;
        }
        let Some(captures) = PROPERTY_RE.captures(line) else {
            continue;
        };
        let key = &captures[1];
        let value = &captures[2];
        match key {
            "cluster-parallel" => command.cluster_parallel = Some(parse_bool(line, value)?),
            "dc-parallel" => command.dc_parallel = Some(parse_bool(line, value)?),
            "description" => command.description = Some(value.to_string()),
            "strategy" => {
                command.strategy = Some(Strategy::from_str(value).map_err(|_| {
                    RingleaderError::BadArgument(format!("unknown strategy '{value}'"))
                })?)
            }
            "argument" => {
                let argument: CommandArgument = serde_json::from_str(value)?;
                if !ENV_NAME_RE.is_match(&argument.name) {
                    return Err(RingleaderError::BadEnvironmentVariable(argument.name));
                }
                command.arguments.push(argument);
            }
            _ => warn!(
                "Ignoring unknown property {key} while parsing {}",
                file.display()
            ),
        }
    }
    Ok(command)
}

fn parse_bool(line: &str, value: &str) -> Result<bool, RingleaderError> {
    match value.to_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(RingleaderError::parse(
            line,
            0,
            format!("expected true or false, got '{value}'"),
        )),
    }
}

/// Lists all available commands: name to definition file, first directory
/// on the search path winning on collisions. Editor backups (`~` suffix)
/// and lock files (`#` prefix) are ignored; the file extension is stripped
/// to form the command name.
pub fn list(dirs: &[PathBuf]) -> BTreeMap<String, PathBuf> {
    let mut commands = BTreeMap::new();
    for dir in dirs {
        let Ok(entries) = fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.ends_with('~') || file_name.starts_with('#') {
                continue;
            }
            let name = match file_name.split_once('.') {
                Some((prefix, _)) => prefix.to_string(),
                None => file_name,
            };
            commands.entry(name).or_insert(path);
        }
    }
    commands
}

/// Loads a command by name from the search path, or by direct file path.
pub fn load(name: &str) -> Result<Command, RingleaderError> {
    let path = resolve(name)?;
    let definition = fs::read_to_string(&path)?;
    parse(name, &path, &definition)
}

fn resolve(name: &str) -> Result<PathBuf, RingleaderError> {
    if !name.contains('/') {
        if let Some(path) = list(&paths::command_dirs()).remove(name) {
            return Ok(path);
        }
    }
    let direct = PathBuf::from(name);
    if direct.is_file() {
        return Ok(direct);
    }
    Err(RingleaderError::UnknownCommand(name.to_string()))
}

/// Loads every command on the search path, skipping unparseable files with
/// a warning.
pub fn get_commands() -> BTreeMap<String, Command> {
    let mut commands = BTreeMap::new();
    for (name, path) in list(&paths::command_dirs()) {
        match fs::read_to_string(&path).map_err(RingleaderError::from).and_then(|definition| {
            parse(&name, &path, &definition)
        }) {
            Ok(command) => {
                commands.insert(name, command);
            }
            Err(e) => warn!("Skipping command {name}: {e}"),
        }
    }
    commands
}
