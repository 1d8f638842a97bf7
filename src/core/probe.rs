// src/core/probe.rs

//! The health probe: everything the supervisor knows about the live cluster
//! comes through here. It turns seed hosts into `Topology` snapshots via
//! nodetool, derives the replica-adjacency graph, and refreshes liveness
//! between dispatches.

use crate::core::adjacency::{self, AdjacencyGraph, CacheKey};
use crate::core::errors::RingleaderError;
use crate::core::nodetool;
use crate::core::state::State;
use crate::core::topology::{Host, Topology};
use crate::remote::{self, ExecutionResult, Remote, SshOptions};
use dashmap::DashMap;
use futures::future::join_all;
use hickory_resolver::TokioAsyncResolver;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How many candidate hosts to try before declaring a cluster unreachable.
const MAX_ATTEMPTS: usize = 3;

/// Ceiling on each individual DNS lookup during the preheat.
const DNS_PREHEAT_TIMEOUT: Duration = Duration::from_secs(1);

/// Keyspaces whose replication carries no scheduling signal.
const SKIPPED_KEYSPACES: [&str; 2] = ["system", "system_schema"];

/// Cached DNS lookups, forward and reverse. DNS failures never fail a run:
/// forward lookups fall back to the literal name when the system resolver is
/// unavailable, reverse lookups simply keep the ip as the display name.
pub struct Resolver {
    inner: Option<TokioAsyncResolver>,
    forward_cache: DashMap<String, String>,
}

impl Resolver {
    pub fn new() -> Self {
        let inner = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => Some(resolver),
            Err(e) => {
                warn!("System DNS configuration unavailable: {e}");
                None
            }
        };
        Self {
            inner,
            forward_cache: DashMap::new(),
        }
    }

    /// Resolves a host name to an ip, caching the answer. Literal ips pass
    /// through untouched.
    pub async fn lookup_ip(&self, name: &str) -> Result<String, RingleaderError> {
        if name.parse::<IpAddr>().is_ok() {
            return Ok(name.to_string());
        }
        if let Some(hit) = self.forward_cache.get(name) {
            return Ok(hit.clone());
        }
        let resolver = self
            .inner
            .as_ref()
            .ok_or_else(|| RingleaderError::UnknownHost(name.to_string()))?;
        let lookup = resolver
            .lookup_ip(name)
            .await
            .map_err(|_| RingleaderError::UnknownHost(name.to_string()))?;
        let ip = lookup
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| lookup.iter().next())
            .ok_or_else(|| RingleaderError::UnknownHost(name.to_string()))?
            .to_string();
        self.forward_cache.insert(name.to_string(), ip.clone());
        Ok(ip)
    }

    /// Best-effort reverse lookup, bounded by the preheat timeout.
    pub async fn reverse(&self, ip: &str) -> Option<String> {
        let resolver = self.inner.as_ref()?;
        let addr: IpAddr = ip.parse().ok()?;
        let lookup =
            tokio::time::timeout(DNS_PREHEAT_TIMEOUT, resolver.reverse_lookup(addr)).await;
        let name = lookup.ok()?.ok()?.iter().next()?.0.to_utf8();
        Some(name.trim_end_matches('.').to_string())
    }

    /// Warms the resolver cache with short, parallel reverse lookups so the
    /// per-host resolution right after does not serialize on slow DNS.
    pub async fn preheat(&self, ips: &[String]) {
        if self.inner.is_none() {
            return;
        }
        debug!("Preheating DNS cache for {} addresses", ips.len());
        join_all(ips.iter().map(|ip| self.reverse(ip))).await;
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

/// One cluster as seen from one working seed.
pub struct ClusterSnapshot {
    pub name: String,
    pub schema_version: String,
    pub topology: Topology,
}

/// The result of probing one or more seeds: the combined (possibly
/// multi-cluster) topology and the adjacency-cache key that identifies the
/// observed ring/schema generation.
pub struct Discovery {
    pub topology: Topology,
    pub cache_key: CacheKey,
}

pub struct HealthProbe {
    ssh: SshOptions,
    jmx_username: Option<String>,
    jmx_password: Option<String>,
    resolver: Resolver,
    connections: HashMap<String, Box<dyn Remote>>,
    preheated: bool,
}

impl HealthProbe {
    pub fn new(ssh: SshOptions, jmx_username: Option<String>, jmx_password: Option<String>) -> Self {
        Self {
            ssh,
            jmx_username,
            jmx_password,
            resolver: Resolver::new(),
            connections: HashMap::new(),
            preheated: false,
        }
    }

    async fn run_nodetool(
        &mut self,
        ip: &str,
        args: &[&str],
    ) -> Result<ExecutionResult, RingleaderError> {
        let mut argv: Vec<String> = vec!["nodetool".to_string()];
        if let (Some(user), Some(password)) = (&self.jmx_username, &self.jmx_password) {
            argv.extend([
                "-u".to_string(),
                user.clone(),
                "-pw".to_string(),
                password.clone(),
            ]);
        }
        argv.extend(args.iter().map(|s| s.to_string()));
        let refs: Vec<&str> = argv.iter().map(String::as_str).collect();

        let conn = self
            .connections
            .entry(ip.to_string())
            .or_insert_with(|| remote::connect(ip, &self.ssh));
        conn.run(&refs).await
    }

    /// Probes one cluster through up to `MAX_ATTEMPTS` seed candidates.
    pub async fn get_cluster_topology(
        &mut self,
        seeds: &[String],
    ) -> Result<ClusterSnapshot, RingleaderError> {
        let mut tried = Vec::new();
        for seed in seeds.iter().take(MAX_ATTEMPTS) {
            tried.push(seed.clone());
            let snapshot = match self.probe_candidate(seed).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    debug!("Seed {seed} failed topology probe: {e}");
                    continue;
                }
            };
            return Ok(snapshot);
        }
        Err(RingleaderError::HostIsDown(format!(
            "Could not find any working host while fetching topology. \
             Is Cassandra actually running? Tried the following hosts: {}",
            tried.join(", ")
        )))
    }

    async fn probe_candidate(&mut self, seed: &str) -> Result<ClusterSnapshot, RingleaderError> {
        let ip = self.resolver.lookup_ip(seed).await?;
        let describe = self.run_nodetool(&ip, &["describecluster"]).await?;
        let status = self.run_nodetool(&ip, &["status"]).await?;
        if !describe.is_success() || !status.is_success() {
            return Err(RingleaderError::HostIsDown(format!(
                "nodetool failed on {seed}"
            )));
        }

        let (cluster_name, schema_version) = nodetool::parse_describe_cluster(&describe.out)?;
        let mut topology = nodetool::parse_status(&status.out, &cluster_name);
        topology = self.resolve_fqdns(topology).await;
        Ok(ClusterSnapshot {
            name: cluster_name,
            schema_version,
            topology,
        })
    }

    /// Replaces each host's ip-as-fqdn with its PTR name where one resolves.
    async fn resolve_fqdns(&mut self, topology: Topology) -> Topology {
        let ips: Vec<String> = topology.iter().map(|h| h.ip.clone()).collect();
        if !self.preheated {
            self.preheated = true;
            self.resolver.preheat(&ips).await;
        }
        let mut hosts = Vec::with_capacity(ips.len());
        for host in topology.iter() {
            let mut host = host.clone();
            if let Some(name) = self.resolver.reverse(&host.ip).await {
                host.fqdn = name;
            }
            hosts.push(host);
        }
        Topology::new(hosts)
    }

    /// Seed-based discovery: each seed contributes its whole cluster; seeds
    /// reaching different clusters union into one multi-cluster topology.
    pub async fn discover(&mut self, seeds: &[String]) -> Result<Discovery, RingleaderError> {
        let mut topology = Topology::default();
        let mut schema_versions = std::collections::BTreeSet::new();
        let mut topology_hashes = std::collections::BTreeSet::new();
        for seed in seeds {
            let snapshot = self.get_cluster_topology(std::slice::from_ref(seed)).await?;
            schema_versions.insert(snapshot.schema_version.clone());
            topology_hashes.insert(snapshot.topology.hash());
            topology = topology.union(&snapshot.topology);
        }
        Ok(Discovery {
            topology,
            cache_key: CacheKey {
                schema_versions,
                topology_hashes,
            },
        })
    }

    /// Explicit-host discovery: every named host is probed as a seed so its
    /// cluster becomes known, but the caller remains in control of which
    /// hosts actually run. Returns the full current topology plus the set of
    /// named ips to restrict the run to.
    pub async fn discover_hosts(
        &mut self,
        hosts: &[String],
    ) -> Result<(Discovery, HashSet<String>), RingleaderError> {
        let mut named_ips = HashSet::new();
        for host in hosts {
            named_ips.insert(self.resolver.lookup_ip(host).await?);
        }

        let mut topology = Topology::default();
        let mut schema_versions = std::collections::BTreeSet::new();
        let mut topology_hashes = std::collections::BTreeSet::new();
        for host in hosts {
            let ip = self.resolver.lookup_ip(host).await?;
            if topology.contains_ip(&ip) {
                continue;
            }
            let snapshot = self.get_cluster_topology(&[ip]).await?;
            schema_versions.insert(snapshot.schema_version.clone());
            topology_hashes.insert(snapshot.topology.hash());
            topology = topology.union(&snapshot.topology);
        }
        Ok((
            Discovery {
                topology,
                cache_key: CacheKey {
                    schema_versions,
                    topology_hashes,
                },
            },
            named_ips,
        ))
    }

    /// Builds (or loads from cache) the replica-adjacency graph for the
    /// given topology. Probing retries across up to three up hosts before
    /// surfacing `HostIsDown`.
    pub async fn get_adjacency(
        &mut self,
        topology: &Topology,
        key_space: Option<&str>,
        cache_key: &CacheKey,
        cache_dir: &Path,
    ) -> Result<AdjacencyGraph, RingleaderError> {
        if let Some(graph) = adjacency::load_cached(cache_dir, cache_key, topology) {
            info!("Using cached replica-adjacency graph");
            return Ok(graph);
        }

        let mut up_hosts: Vec<Host> = topology.get_up().iter().cloned().collect();
        up_hosts.sort_by_key(|h| h.position_key());

        let mut tried = Vec::new();
        for host in up_hosts.iter().take(MAX_ATTEMPTS) {
            tried.push(host.fqdn.clone());
            match self.adjacency_from_candidate(host, topology, key_space).await {
                Ok(graph) => {
                    if let Err(e) = adjacency::store_cached(cache_dir, cache_key, &graph) {
                        warn!("Could not store adjacency cache: {e}");
                    }
                    return Ok(graph);
                }
                Err(e) => {
                    debug!("Host {} failed adjacency probe: {e}", host.fqdn);
                }
            }
        }
        Err(RingleaderError::HostIsDown(format!(
            "Could not find any working host while fetching the replica graph. \
             Tried the following hosts: {}",
            tried.join(", ")
        )))
    }

    async fn adjacency_from_candidate(
        &mut self,
        host: &Host,
        topology: &Topology,
        key_space: Option<&str>,
    ) -> Result<AdjacencyGraph, RingleaderError> {
        let keyspaces = match key_space {
            Some(ks) => vec![ks.to_string()],
            None => {
                let cfstats = self
                    .run_nodetool(&host.ip, &["cfstats", "|", "grep", "Keyspace"])
                    .await?;
                nodetool::extract_keyspaces_from_cfstats(&cfstats.out)
            }
        };

        let mut graphs = Vec::new();
        for keyspace in keyspaces {
            if SKIPPED_KEYSPACES.contains(&keyspace.as_str()) {
                continue;
            }
            debug!("Fetching replica ranges for keyspace {keyspace}");
            let res = self
                .run_nodetool(&host.ip, &["describering", keyspace.as_str()])
                .await?;
            if !res.is_success() {
                if keyspace.starts_with("system") {
                    continue;
                }
                return Err(RingleaderError::HostIsDown(format!(
                    "describering {keyspace} failed on {}",
                    host.fqdn
                )));
            }
            let ranges = nodetool::parse_describering(&res.out)?;
            let resolved = self.resolve_endpoints(&ranges).await?;
            graphs.push(AdjacencyGraph::from_ranges(&ranges, topology, |name| {
                resolved
                    .get(name)
                    .cloned()
                    .ok_or_else(|| RingleaderError::UnknownHost(name.to_string()))
            })?);
        }
        Ok(AdjacencyGraph::merge(graphs))
    }

    async fn resolve_endpoints(
        &self,
        ranges: &[nodetool::TokenRange],
    ) -> Result<HashMap<String, String>, RingleaderError> {
        let mut resolved = HashMap::new();
        for range in ranges {
            for endpoint in &range.endpoints {
                if !resolved.contains_key(endpoint) {
                    let ip = self.resolver.lookup_ip(endpoint).await?;
                    resolved.insert(endpoint.clone(), ip);
                }
            }
        }
        Ok(resolved)
    }

    /// Re-observes cluster membership and liveness, preferring idle up hosts
    /// (minus `skip`) as probe seeds. With the all strategy every node may be
    /// running, so any up host serves as a fallback seed.
    pub async fn refresh_topology(
        &mut self,
        state: &State,
        skip: &[Host],
    ) -> Result<Topology, RingleaderError> {
        let mut new_topology = Topology::default();
        for cluster in state.original_topology.get_clusters() {
            let mut seeds: Vec<String> = state
                .get_idle()
                .with_cluster(&cluster)
                .without_hosts(skip)
                .get_up()
                .iter()
                .map(|h| h.ip.clone())
                .collect();
            if seeds.is_empty() {
                seeds = state
                    .current_topology
                    .with_cluster(&cluster)
                    .get_up()
                    .iter()
                    .map(|h| h.ip.clone())
                    .collect();
            }
            seeds.sort();
            let snapshot = self.get_cluster_topology(&seeds).await?;
            new_topology = new_topology.union(&snapshot.topology);
        }
        Ok(new_topology)
    }

    pub async fn close(&mut self) {
        for (_, mut conn) in self.connections.drain() {
            conn.close().await;
        }
    }
}
