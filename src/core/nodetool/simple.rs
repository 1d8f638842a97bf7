// src/core/nodetool/simple.rs

//! Single-regex extractions from nodetool output: cluster identity from
//! `describecluster` and keyspace names from `cfstats`.

use crate::core::errors::RingleaderError;
use once_cell::sync::Lazy;
use regex::Regex;

static CLUSTER_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*Name:\s*(.*)$").unwrap());
static SCHEMA_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)([0-9A-Fa-f]{8}(?:-[0-9A-Fa-f]{4}){3}-[0-9A-Fa-f]{12}): ").unwrap());
static KEYSPACE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*Keyspace\s*:\s*(.*)$").unwrap());

/// Extracts (cluster name, schema version) from `nodetool describecluster`.
pub fn parse_describe_cluster(text: &str) -> Result<(String, String), RingleaderError> {
    let name = CLUSTER_NAME_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .ok_or_else(|| {
            RingleaderError::parse(first_line(text), 0, "No cluster name in describecluster output")
        })?;
    let schema_version = SCHEMA_VERSION_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            RingleaderError::parse(first_line(text), 0, "No schema version in describecluster output")
        })?;
    Ok((name, schema_version))
}

/// Extracts every keyspace name mentioned in `nodetool cfstats` output.
pub fn extract_keyspaces_from_cfstats(text: &str) -> Vec<String> {
    KEYSPACE_NAME_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().to_string()
}
