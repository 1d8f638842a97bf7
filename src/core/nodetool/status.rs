// src/core/nodetool/status.rs

//! Parses `nodetool status` output into a `Topology`.

use crate::core::topology::{Host, Topology};
use once_cell::sync::Lazy;
use regex::Regex;

static STATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]{2}$").unwrap());
static IP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").unwrap());
static TOKENS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());
static HOST_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Fa-f]{8}(?:-[0-9A-Fa-f]{4}){3}-[0-9A-Fa-f]{12}$").unwrap());
static RACK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+$").unwrap());

/// One well-formed node line:
/// `UN  10.0.0.1  106.55 KB  256  33.3%  7f9f8c9e-...  rac1`
/// Load is two words, so a node line always splits into exactly eight.
fn parse_node(line: &str) -> Option<(String, String, String, String)> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.len() == 8
        && STATE_RE.is_match(words[0])
        && IP_RE.is_match(words[1])
        && TOKENS_RE.is_match(words[4])
        && HOST_ID_RE.is_match(words[6])
        && RACK_RE.is_match(words[7])
    {
        Some((
            words[0].to_string(),
            words[1].to_string(),
            words[6].to_string(),
            words[7].to_string(),
        ))
    } else {
        None
    }
}

/// Parses the status listing. Hosts keep their ip as fqdn; the health probe
/// substitutes resolved names afterwards when reverse DNS is available.
/// Lines that do not look like node rows (headers, legends, load warnings)
/// are skipped rather than rejected.
pub fn parse_status(text: &str, cluster_name: &str) -> Topology {
    let mut hosts = Vec::new();
    for section in text.split("Datacenter: ").skip(1) {
        let mut lines = section.lines();
        let dc_name = lines.next().unwrap_or_default().trim().to_string();
        for line in lines {
            if let Some((state, ip, host_id, rack)) = parse_node(line) {
                hosts.push(Host {
                    fqdn: ip.clone(),
                    ip,
                    dc: dc_name.clone(),
                    cluster: cluster_name.to_string(),
                    rack,
                    is_up: state == "UN",
                    token: None,
                    host_id: Some(host_id),
                });
            }
        }
    }
    Topology::new(hosts)
}
