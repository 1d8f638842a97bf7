// src/core/state.rs

//! The aggregate scheduling state: everything needed to decide which node
//! (if any) to run on next.
//!
//! The state tracks two potentially different topologies. `original_topology`
//! is the set of hosts the job needs to run on; `current_topology` is the
//! latest observed membership of those same clusters. They are identical for
//! most operations, but node replacements and decommissions can make them
//! legitimately diverge towards the end of a run.
//!
//! This type is meant to be used without mutating it: every transition
//! produces a new `State` value.

use crate::core::adjacency::AdjacencyGraph;
use crate::core::errors::RingleaderError;
use crate::core::progress::Progress;
use crate::core::strategy::{self, Strategy};
use crate::core::topology::{Host, Topology};

#[derive(Debug, Clone)]
pub struct State {
    pub original_topology: Topology,
    pub current_topology: Topology,
    pub strategy: Strategy,
    pub adjacency: Option<AdjacencyGraph>,
    pub progress: Progress,
    pub cluster_parallel: bool,
    pub dc_parallel: bool,
    pub max_concurrency: Option<usize>,
    pub stop_after: Option<usize>,
    pub ignore_down_nodes: bool,
}

impl State {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        original_topology: Topology,
        strategy: Strategy,
        adjacency: Option<AdjacencyGraph>,
        cluster_parallel: bool,
        dc_parallel: bool,
        max_concurrency: Option<usize>,
        current_topology: Option<Topology>,
        stop_after: Option<usize>,
        ignore_down_nodes: bool,
    ) -> Self {
        let current_topology = current_topology.unwrap_or_else(|| original_topology.clone());
        Self {
            original_topology,
            current_topology,
            strategy,
            adjacency,
            progress: Progress::new(),
            cluster_parallel,
            dc_parallel,
            max_concurrency,
            stop_after,
            ignore_down_nodes,
        }
    }

    /// Derived state with a refreshed observation of cluster membership.
    pub fn with_topology(&self, new_topology: Topology) -> State {
        let mut res = self.clone();
        res.current_topology = new_topology;
        res
    }

    pub fn with_running(&self, host: Host) -> State {
        self.with_progress(self.progress.with_running(host))
    }

    pub fn with_done(&self, host: Host) -> State {
        self.with_progress(self.progress.with_done(host))
    }

    pub fn with_failed(&self, host: Host) -> State {
        self.with_progress(self.progress.with_failed(host))
    }

    pub fn with_progress(&self, progress: Progress) -> State {
        let mut res = self.clone();
        res.progress = progress;
        res
    }

    /// Delegates the scheduling decision to the strategy function.
    pub fn find_next_host(&self) -> Result<Option<Host>, RingleaderError> {
        strategy::find_next_host(
            self.strategy,
            &self.original_topology,
            self.adjacency.as_ref(),
            &self.progress,
            self.cluster_parallel,
            self.dc_parallel,
            self.max_concurrency,
            self.stop_after,
            self.ignore_down_nodes,
        )
    }

    /// True when every intended host has finished, or the `stop_after`
    /// budget has been reached.
    pub fn is_done(&self) -> bool {
        if self.progress.done.len() == self.original_topology.len() {
            return true;
        }
        match self.stop_after {
            Some(stop_after) => self.progress.touched() >= stop_after,
            None => false,
        }
    }

    /// True when every host currently observed down is one of our own
    /// in-flight runners, i.e. the down-ness is self-inflicted.
    pub fn is_healthy(&self) -> bool {
        if self.ignore_down_nodes {
            return true;
        }
        self.current_topology
            .without_hosts(&self.progress.running)
            .get_down()
            .is_empty()
    }

    /// Hosts in the current topology with no runner on them.
    pub fn get_idle(&self) -> Topology {
        self.current_topology.without_hosts(&self.progress.running)
    }
}
