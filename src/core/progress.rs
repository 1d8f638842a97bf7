// src/core/progress.rs

//! Tracks the progress of a job in terms of what state each node is in.
//!
//! The three sets are pairwise disjoint. A host leaves `running` the moment
//! it enters `done` or `failed`, and no host ever returns to idle after
//! leaving it. The type is meant to be used without mutating it.

use crate::core::topology::Host;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Progress {
    pub done: HashSet<Host>,
    pub running: HashSet<Host>,
    pub failed: HashSet<Host>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derived copy with the host added to `running`.
    pub fn with_running(&self, host: Host) -> Progress {
        let mut res = self.clone();
        res.running.insert(host);
        res
    }

    /// Derived copy with the host moved to `done`.
    pub fn with_done(&self, host: Host) -> Progress {
        let mut res = self.clone();
        res.running.remove(&host);
        res.done.insert(host);
        res
    }

    /// Derived copy with the host moved to `failed`.
    pub fn with_failed(&self, host: Host) -> Progress {
        let mut res = self.clone();
        res.running.remove(&host);
        res.failed.insert(host);
        res
    }

    /// Derived copy with `failed` emptied, used by `continue --retry-failed`
    /// before any dispatch happens.
    pub fn with_failed_cleared(&self) -> Progress {
        let mut res = self.clone();
        res.failed.clear();
        res
    }

    /// Number of hosts that have been dispatched at some point.
    pub fn touched(&self) -> usize {
        self.done.len() + self.running.len() + self.failed.len()
    }
}
