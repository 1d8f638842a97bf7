// src/core/topology.rs

//! Immutable description of one or more Cassandra clusters.
//!
//! A `Topology` is a set of `Host` records with utility methods for deriving
//! filtered sub-topologies. Host identity is the ip address: two `Host`
//! values with the same ip are the same node, regardless of any other field.
//! The type is meant to be used without mutating it; every filter returns a
//! fresh `Topology`.

use crate::core::errors::RingleaderError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// A single Cassandra node as observed by the health probe.
///
/// Either `token` or `host_id` acts as the node's stable position identifier;
/// `nodetool status` yields host ids while ring output yields tokens, and a
/// topology built from one source may lack the other field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub fqdn: String,
    pub ip: String,
    pub dc: String,
    pub cluster: String,
    pub rack: String,
    pub is_up: bool,
    #[serde(default)]
    pub token: Option<i64>,
    #[serde(default)]
    pub host_id: Option<String>,
}

impl Host {
    /// Stable ordering key: position identifier first, ip as tie-break.
    pub fn position_key(&self) -> (i64, String, String) {
        (
            self.token.unwrap_or(i64::MAX),
            self.host_id.clone().unwrap_or_default(),
            self.ip.clone(),
        )
    }

    /// The identifier contributing to the topology hash.
    pub fn identifier(&self) -> String {
        if let Some(id) = &self.host_id {
            id.clone()
        } else if let Some(token) = self.token {
            token.to_string()
        } else {
            self.ip.clone()
        }
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.ip == other.ip
    }
}

impl Eq for Host {}

impl std::hash::Hash for Host {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ip.hash(state);
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fqdn)
    }
}

/// A datacenter, identified by the pair (cluster, dc).
///
/// Datacenter names are only unique within a cluster, so all dc-scoped
/// operations key on the full pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Datacenter {
    pub cluster: String,
    pub dc: String,
}

/// An immutable set of hosts spanning one or more clusters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topology {
    hosts: HashSet<Host>,
}

impl Topology {
    pub fn new(hosts: impl IntoIterator<Item = Host>) -> Self {
        Self {
            hosts: hosts.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Host> {
        self.hosts.iter()
    }

    pub fn contains(&self, host: &Host) -> bool {
        self.hosts.contains(host)
    }

    pub fn contains_ip(&self, ip: &str) -> bool {
        self.hosts.iter().any(|h| h.ip == ip)
    }

    /// Returns the first host in deterministic order: position identifier
    /// ascending, then ip ascending. Scheduling tie-breaks rely on this
    /// being reproducible for identical inputs.
    pub fn first(&self) -> Option<Host> {
        self.hosts.iter().min_by_key(|h| h.position_key()).cloned()
    }

    /// Looks up a host by ip.
    pub fn get_host(&self, ip: &str) -> Result<Host, RingleaderError> {
        self.hosts
            .iter()
            .find(|h| h.ip == ip)
            .cloned()
            .ok_or_else(|| RingleaderError::UnknownHost(ip.to_string()))
    }

    /// Sub-topology filtered on cluster name.
    pub fn with_cluster(&self, cluster: &str) -> Topology {
        Topology::new(self.hosts.iter().filter(|h| h.cluster == cluster).cloned())
    }

    /// Sub-topology filtered on the (cluster, dc) pair.
    pub fn with_dc(&self, cluster: &str, dc: &str) -> Topology {
        Topology::new(
            self.hosts
                .iter()
                .filter(|h| h.cluster == cluster && h.dc == dc)
                .cloned(),
        )
    }

    /// Sub-topology filtered on dc name alone, across all clusters.
    ///
    /// If clusters share a dc name, all of them are retained. This exists
    /// only for the operator-facing `--dc-filter` flag; prefer `with_dc`.
    pub fn with_dc_filter(&self, dc: &str) -> Topology {
        Topology::new(self.hosts.iter().filter(|h| h.dc == dc).cloned())
    }

    /// Sub-topology without the given host.
    pub fn without_host(&self, host: &Host) -> Topology {
        Topology::new(self.hosts.iter().filter(|h| *h != host).cloned())
    }

    /// Sub-topology without any of the given hosts.
    pub fn without_hosts<'a>(&self, hosts: impl IntoIterator<Item = &'a Host>) -> Topology {
        let excluded: HashSet<&Host> = hosts.into_iter().collect();
        Topology::new(
            self.hosts
                .iter()
                .filter(|h| !excluded.contains(h))
                .cloned(),
        )
    }

    /// Set union of two topologies.
    pub fn union(&self, other: &Topology) -> Topology {
        Topology::new(self.hosts.iter().chain(other.hosts.iter()).cloned())
    }

    /// All distinct cluster names in this topology.
    pub fn get_clusters(&self) -> BTreeSet<String> {
        self.hosts.iter().map(|h| h.cluster.clone()).collect()
    }

    /// All distinct (cluster, dc) pairs in this topology.
    pub fn get_dcs(&self) -> BTreeSet<Datacenter> {
        self.hosts
            .iter()
            .map(|h| Datacenter {
                cluster: h.cluster.clone(),
                dc: h.dc.clone(),
            })
            .collect()
    }

    /// All nodes currently marked up.
    pub fn get_up(&self) -> Topology {
        Topology::new(self.hosts.iter().filter(|h| h.is_up).cloned())
    }

    /// All nodes currently marked down.
    pub fn get_down(&self) -> Topology {
        Topology::new(self.hosts.iter().filter(|h| !h.is_up).cloned())
    }

    /// Stable digest of the topology, used as an adjacency-cache key
    /// component. Independent of host insertion order and of liveness:
    /// only cluster names and position identifiers contribute.
    pub fn hash(&self) -> String {
        let clusters: Vec<String> = self.get_clusters().into_iter().collect();
        let mut identifiers: Vec<String> = self.hosts.iter().map(|h| h.identifier()).collect();
        identifiers.sort();

        let mut digest = Sha256::new();
        digest.update(clusters.join("-").as_bytes());
        digest.update(identifiers.join("-").as_bytes());
        hex::encode(digest.finalize())
    }
}

impl FromIterator<Host> for Topology {
    fn from_iter<T: IntoIterator<Item = Host>>(iter: T) -> Self {
        Topology::new(iter)
    }
}

impl<'a> IntoIterator for &'a Topology {
    type Item = &'a Host;
    type IntoIter = std::collections::hash_set::Iter<'a, Host>;

    fn into_iter(self) -> Self::IntoIter {
        self.hosts.iter()
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hosts: Vec<&Host> = self.hosts.iter().collect();
        hosts.sort_by_key(|h| h.position_key());
        let names: Vec<&str> = hosts.iter().map(|h| h.fqdn.as_str()).collect();
        write!(f, "{}", names.join(" "))
    }
}

impl PartialEq for Topology {
    fn eq(&self, other: &Self) -> bool {
        self.hosts == other.hosts
    }
}

impl Eq for Topology {}
