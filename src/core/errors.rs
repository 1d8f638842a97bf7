// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the orchestrator.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum RingleaderError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// None of `--seed-host`, `--host` and `--host-file` was supplied.
    #[error("No hosts specified")]
    NoHostsSpecified,

    /// A mandatory liveness precondition was violated before dispatch.
    #[error("Host is down: {0}")]
    HostIsDown(String),

    /// Lookup of an ip against a topology failed.
    #[error("Unknown host: {0}")]
    UnknownHost(String),

    /// The transport failed to establish a session or the session was reset.
    #[error("SSH failure: {0}")]
    BadSshHost(String),

    /// A command argument name is not usable as an environment variable.
    #[error("Bad environment variable name: '{0}'")]
    BadEnvironmentVariable(String),

    /// An operator-supplied value failed validation.
    #[error("Bad argument: {0}")]
    BadArgument(String),

    /// A command definition could not be located on the search path.
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    /// The job journal was written by an incompatible version of this tool.
    #[error("Incompatible file format version: {0}")]
    BadFileFormatVersion(String),

    /// The job journal is older than the maximum permitted age.
    #[error("Job file too old: {0}")]
    FileTooOld(String),

    /// Malformed input from upstream tooling (nodetool and friends).
    /// Rendered with a caret pointing at the offending column.
    #[error("{}\n{}^\n{}", line, " ".repeat(*offset), message)]
    Parse {
        line: String,
        offset: usize,
        message: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RingleaderError {
    /// Builds a `Parse` error for a given source line and column.
    pub fn parse(line: impl Into<String>, offset: usize, message: impl Into<String>) -> Self {
        RingleaderError::Parse {
            line: line.into(),
            offset,
            message: message.into(),
        }
    }
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// We wrap it in an Arc to allow for cheap, shared cloning.
impl Clone for RingleaderError {
    fn clone(&self) -> Self {
        match self {
            RingleaderError::Io(e) => RingleaderError::Io(Arc::clone(e)),
            RingleaderError::NoHostsSpecified => RingleaderError::NoHostsSpecified,
            RingleaderError::HostIsDown(s) => RingleaderError::HostIsDown(s.clone()),
            RingleaderError::UnknownHost(s) => RingleaderError::UnknownHost(s.clone()),
            RingleaderError::BadSshHost(s) => RingleaderError::BadSshHost(s.clone()),
            RingleaderError::BadEnvironmentVariable(s) => {
                RingleaderError::BadEnvironmentVariable(s.clone())
            }
            RingleaderError::BadArgument(s) => RingleaderError::BadArgument(s.clone()),
            RingleaderError::UnknownCommand(s) => RingleaderError::UnknownCommand(s.clone()),
            RingleaderError::BadFileFormatVersion(s) => {
                RingleaderError::BadFileFormatVersion(s.clone())
            }
            RingleaderError::FileTooOld(s) => RingleaderError::FileTooOld(s.clone()),
            RingleaderError::Parse {
                line,
                offset,
                message,
            } => RingleaderError::Parse {
                line: line.clone(),
                offset: *offset,
                message: message.clone(),
            },
            RingleaderError::Internal(s) => RingleaderError::Internal(s.clone()),
        }
    }
}

impl From<std::io::Error> for RingleaderError {
    fn from(e: std::io::Error) -> Self {
        RingleaderError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for RingleaderError {
    fn from(e: serde_json::Error) -> Self {
        RingleaderError::Internal(format!("JSON serialization/deserialization error: {e}"))
    }
}

impl From<uuid::Error> for RingleaderError {
    fn from(e: uuid::Error) -> Self {
        RingleaderError::BadArgument(format!("invalid job id: {e}"))
    }
}
