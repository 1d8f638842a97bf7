// src/core/strategy.rs

//! The concurrency strategies and the scheduling decision function.
//!
//! `find_next_host` is a pure function of the scheduling inputs: identical
//! inputs always produce the identical decision, which the supervisor (and
//! the tests) rely on. The supervisor calls it repeatedly, moving each
//! returned host to running, until it returns `None`.

use crate::core::adjacency::AdjacencyGraph;
use crate::core::errors::RingleaderError;
use crate::core::progress::Progress;
use crate::core::topology::{Host, Topology};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strum_macros::{Display, EnumString};

/// The three concurrency strategies.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, Default,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// One host at a time within the partition constraints.
    One,
    /// Any set of hosts that are pairwise non-adjacent in the replica graph.
    #[default]
    Topology,
    /// Any subset of hosts.
    All,
}

/// Decides which host (if any) to dispatch next.
///
/// Returns `Ok(None)` when nothing can run right now; fails with
/// `HostIsDown` when a host that still needs to run is down and
/// `ignore_down_nodes` is false. That error is fatal to the whole run.
#[allow(clippy::too_many_arguments)]
pub fn find_next_host(
    strategy: Strategy,
    topology: &Topology,
    adjacency: Option<&AdjacencyGraph>,
    progress: &Progress,
    cluster_parallel: bool,
    dc_parallel: bool,
    max_concurrency: Option<usize>,
    stop_after: Option<usize>,
    ignore_down_nodes: bool,
) -> Result<Option<Host>, RingleaderError> {
    if let Some(stop_after) = stop_after {
        if progress.touched() >= stop_after {
            return Ok(None);
        }
    }

    let mut remaining = topology
        .without_hosts(&progress.done)
        .without_hosts(&progress.running)
        .without_hosts(&progress.failed);

    if let Some(running) = progress.running.iter().next() {
        if !cluster_parallel {
            remaining = remaining.with_cluster(&running.cluster);
        }
        if !dc_parallel {
            remaining = remaining.with_dc(&running.cluster, &running.dc);
        }
    }

    if remaining.is_empty() {
        return Ok(None);
    }

    if let Some(max_concurrency) = max_concurrency {
        if progress.running.len() >= max_concurrency {
            return Ok(None);
        }
    }

    if !ignore_down_nodes {
        if let Some(down) = remaining.iter().find(|h| !h.is_up) {
            return Err(RingleaderError::HostIsDown(down.fqdn.clone()));
        }
    }

    let next = match strategy {
        Strategy::All => remaining.first(),
        Strategy::One => {
            // One host at a time within each partition: a running host
            // blocks its whole (cluster, dc). With the serial flags the
            // earlier restrictions pin remaining to one partition, so this
            // degenerates to one host globally.
            let busy: HashSet<(&str, &str)> = progress
                .running
                .iter()
                .map(|h| (h.cluster.as_str(), h.dc.as_str()))
                .collect();
            Topology::new(
                remaining
                    .iter()
                    .filter(|h| !busy.contains(&(h.cluster.as_str(), h.dc.as_str())))
                    .cloned(),
            )
            .first()
        }
        Strategy::Topology => {
            let blocked: HashSet<&Host> = progress
                .running
                .iter()
                .flat_map(|h| adjacency.map(|a| a.neighbors(h)).into_iter().flatten())
                .collect();
            remaining.without_hosts(blocked.into_iter()).first()
        }
    };
    Ok(next)
}
