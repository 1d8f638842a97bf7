// src/core/adjacency.rs

//! The replica-adjacency graph: which hosts replicate the same token ranges.
//!
//! Two hosts are adjacent when at least one replicated range lists both as
//! endpoints and both sit in the same datacenter. Hosts in different
//! datacenters are never adjacent, because different datacenters are
//! scheduled independently. The graph is symmetric by construction but
//! stored both ways for O(1) neighbor lookups.

use crate::core::errors::RingleaderError;
use crate::core::nodetool::TokenRange;
use crate::core::topology::{Host, Topology};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Format version of the on-disk cache. The cache is purely a performance
/// optimization and is discarded on any format change.
const CACHE_FORMAT_VERSION: u32 = 1;

static EMPTY: once_cell::sync::Lazy<HashSet<Host>> =
    once_cell::sync::Lazy::new(HashSet::new);

#[derive(Debug, Clone, Default)]
pub struct AdjacencyGraph {
    map: HashMap<Host, HashSet<Host>>,
}

impl AdjacencyGraph {
    /// Builds a graph directly from a host map.
    pub fn from_map(map: HashMap<Host, HashSet<Host>>) -> AdjacencyGraph {
        AdjacencyGraph { map }
    }

    /// Builds the graph for one keyspace from its describering range list.
    ///
    /// Endpoint names are resolved to ips through `lookup` (injected so the
    /// resolver can be cached, and so tests never touch DNS), mapped onto
    /// hosts of `topology`, and cross-datacenter pairs are dropped. Every
    /// host of `topology` gets an entry, isolated hosts an empty one.
    pub fn from_ranges<F>(
        ranges: &[TokenRange],
        topology: &Topology,
        lookup: F,
    ) -> Result<AdjacencyGraph, RingleaderError>
    where
        F: Fn(&str) -> Result<String, RingleaderError>,
    {
        let mut raw: HashMap<String, HashSet<String>> = HashMap::new();
        for range in ranges {
            for a in &range.endpoints {
                for b in &range.endpoints {
                    if a != b {
                        raw.entry(a.clone()).or_default().insert(b.clone());
                    }
                }
            }
        }

        let mut map: HashMap<Host, HashSet<Host>> = HashMap::new();
        for host in topology.iter() {
            map.insert(host.clone(), HashSet::new());
        }
        for (raw_host, raw_friends) in raw {
            let host = topology.get_host(&lookup(&raw_host)?)?;
            let mut friends = HashSet::new();
            for raw_friend in raw_friends {
                let friend = topology.get_host(&lookup(&raw_friend)?)?;
                if friend.dc == host.dc && friend.cluster == host.cluster {
                    friends.insert(friend);
                }
            }
            map.insert(host, friends);
        }
        Ok(AdjacencyGraph { map })
    }

    /// Unions the per-keyspace graphs into one.
    pub fn merge(graphs: impl IntoIterator<Item = AdjacencyGraph>) -> AdjacencyGraph {
        let mut map: HashMap<Host, HashSet<Host>> = HashMap::new();
        for graph in graphs {
            for (host, friends) in graph.map {
                map.entry(host).or_default().extend(friends);
            }
        }
        AdjacencyGraph { map }
    }

    /// The hosts adjacent to `host`. Unknown hosts have no neighbors.
    pub fn neighbors(&self, host: &Host) -> &HashSet<Host> {
        self.map.get(host).unwrap_or(&EMPTY)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Host, &HashSet<Host>)> {
        self.map.iter()
    }
}

/// The adjacency-cache key: the unordered pair of sorted sets
/// (schema versions, topology hashes) observed during the health probe.
/// Any ring or schema change produces a different key, so stale caches are
/// ignored automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub schema_versions: BTreeSet<String>,
    pub topology_hashes: BTreeSet<String>,
}

impl CacheKey {
    fn file_name(&self) -> String {
        let schemas: Vec<&str> = self.schema_versions.iter().map(String::as_str).collect();
        // Topology hashes are long; a 12-char prefix keeps file names within
        // platform limits while still changing on any topology change.
        let topologies: Vec<String> = self
            .topology_hashes
            .iter()
            .map(|h| h.chars().take(12).collect())
            .collect();
        format!(
            "adjacency-v{}-{}-{}.json",
            CACHE_FORMAT_VERSION,
            schemas.join("_"),
            topologies.join("_")
        )
    }
}

/// On-disk representation: ips only, rehydrated against the live topology.
#[derive(Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    adjacency: BTreeMap<String, Vec<String>>,
}

/// Loads a cached graph if one exists for `key` and still matches the
/// current topology. Any unreadable, stale or incompatible cache is treated
/// as a miss.
pub fn load_cached(
    cache_dir: &Path,
    key: &CacheKey,
    topology: &Topology,
) -> Option<AdjacencyGraph> {
    let path = cache_dir.join(key.file_name());
    let raw = fs::read_to_string(&path).ok()?;
    let doc: CacheDocument = match serde_json::from_str(&raw) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("Ignoring unreadable adjacency cache {}: {}", path.display(), e);
            return None;
        }
    };
    if doc.version != CACHE_FORMAT_VERSION {
        return None;
    }

    let mut map: HashMap<Host, HashSet<Host>> = HashMap::new();
    for (ip, friend_ips) in doc.adjacency {
        let host = topology.get_host(&ip).ok()?;
        let mut friends = HashSet::new();
        for friend_ip in friend_ips {
            friends.insert(topology.get_host(&friend_ip).ok()?);
        }
        map.insert(host, friends);
    }
    debug!("Loaded adjacency graph from {}", path.display());
    Some(AdjacencyGraph { map })
}

/// Stores the graph under the cache key. Whole-file replacement: written to
/// a temporary file first, then renamed into place.
pub fn store_cached(
    cache_dir: &Path,
    key: &CacheKey,
    graph: &AdjacencyGraph,
) -> Result<(), RingleaderError> {
    fs::create_dir_all(cache_dir)?;
    let doc = CacheDocument {
        version: CACHE_FORMAT_VERSION,
        adjacency: graph
            .map
            .iter()
            .map(|(host, friends)| {
                let mut ips: Vec<String> = friends.iter().map(|f| f.ip.clone()).collect();
                ips.sort();
                (host.ip.clone(), ips)
            })
            .collect(),
    };

    let path = cache_dir.join(key.file_name());
    let temp_path = temp_sibling(&path);
    fs::write(&temp_path, serde_json::to_string_pretty(&doc)?)?;
    fs::rename(&temp_path, &path)?;
    debug!("Stored adjacency graph in {}", path.display());
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".tmp.{}", rand::random::<u32>()));
    path.with_file_name(name)
}
