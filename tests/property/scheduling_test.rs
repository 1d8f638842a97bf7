// tests/property/scheduling_test.rs

//! Scheduling invariants under arbitrary interleavings of dispatch and
//! completion.

use proptest::prelude::*;
use ringleader::core::adjacency::AdjacencyGraph;
use ringleader::core::state::State;
use ringleader::core::strategy::Strategy;
use ringleader::core::topology::{Host, Topology};
use std::collections::{HashMap, HashSet};

fn host(ip: &str, dc: &str, cluster: &str, token: i64, is_up: bool) -> Host {
    Host {
        fqdn: format!("node-{ip}"),
        ip: ip.to_string(),
        dc: dc.to_string(),
        cluster: cluster.to_string(),
        rack: "rac1".to_string(),
        is_up,
        token: Some(token),
        host_id: None,
    }
}

/// Eight hosts over two clusters with two dcs each.
fn fixed_topology() -> Topology {
    let mut hosts = Vec::new();
    for i in 0..2i64 {
        hosts.push(host(&format!("10.1.1.{i}"), "eu", "cluster1", i * 10, true));
        hosts.push(host(&format!("10.1.2.{i}"), "us", "cluster1", i * 10 + 1, true));
        hosts.push(host(&format!("10.2.1.{i}"), "eu", "cluster2", i * 10 + 2, true));
        hosts.push(host(&format!("10.2.2.{i}"), "us", "cluster2", i * 10 + 3, true));
    }
    Topology::new(hosts)
}

/// A single-partition ring of `size` hosts where each host is adjacent to
/// its two neighbors on each side.
fn ring(size: i64) -> (Topology, AdjacencyGraph) {
    let hosts: Vec<Host> = (0..size)
        .map(|i| host(&format!("10.0.0.{i}"), "eu", "cluster1", i * 100, true))
        .collect();
    let topology = Topology::new(hosts.clone());
    let mut map: HashMap<Host, HashSet<Host>> = HashMap::new();
    for i in 0..size {
        for j in [
            (i + 1) % size,
            (i + 2) % size,
            (i + size - 2) % size,
            (i + size - 1) % size,
        ] {
            if i != j {
                map.entry(hosts[i as usize].clone())
                    .or_default()
                    .insert(hosts[j as usize].clone());
            }
        }
    }
    (topology, AdjacencyGraph::from_map(map))
}

fn sorted_running(state: &State) -> Vec<Host> {
    let mut running: Vec<Host> = state.progress.running.iter().cloned().collect();
    running.sort_by_key(|h| h.position_key());
    running
}

fn assert_disjoint(state: &State) {
    let progress = &state.progress;
    for h in &progress.done {
        assert!(!progress.running.contains(h));
        assert!(!progress.failed.contains(h));
    }
    for h in &progress.running {
        assert!(!progress.failed.contains(h));
    }
}

/// Applies one randomized step: dispatch, complete, or fail.
fn step(state: State, op: u8, pick: u8) -> State {
    match op % 3 {
        0 => match state.find_next_host().unwrap() {
            Some(h) => state.with_running(h),
            None => state,
        },
        1 => {
            let running = sorted_running(&state);
            match running.get(pick as usize % running.len().max(1)) {
                Some(h) => state.with_done(h.clone()),
                None => state,
            }
        }
        _ => {
            let running = sorted_running(&state);
            match running.get(pick as usize % running.len().max(1)) {
                Some(h) => state.with_failed(h.clone()),
                None => state,
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    #[test]
    fn prop_progress_sets_stay_disjoint(
        ops in prop::collection::vec((any::<u8>(), any::<u8>()), 0..64)
    ) {
        let topology = fixed_topology();
        let mut state = State::new(
            topology.clone(), Strategy::All, None, true, true, None, None, None, false,
        );
        for (op, pick) in ops {
            state = step(state, op, pick);
            assert_disjoint(&state);
            for h in state.progress.done.iter()
                .chain(&state.progress.running)
                .chain(&state.progress.failed)
            {
                assert!(topology.contains(h));
            }
        }
    }

    #[test]
    fn prop_pick_is_from_remaining(
        ops in prop::collection::vec((any::<u8>(), any::<u8>()), 0..48)
    ) {
        let topology = fixed_topology();
        let mut state = State::new(
            topology.clone(), Strategy::All, None, true, true, None, None, None, false,
        );
        for (op, pick) in ops {
            if let Some(h) = state.find_next_host().unwrap() {
                assert!(topology.contains(&h));
                assert!(!state.progress.done.contains(&h));
                assert!(!state.progress.running.contains(&h));
                assert!(!state.progress.failed.contains(&h));
            }
            state = step(state, op, pick);
        }
    }

    #[test]
    fn prop_max_concurrency_is_never_exceeded(
        max in 1usize..6,
        ops in prop::collection::vec((any::<u8>(), any::<u8>()), 0..64)
    ) {
        let mut state = State::new(
            fixed_topology(), Strategy::All, None, true, true, Some(max), None, None, false,
        );
        for (op, pick) in ops {
            state = step(state, op, pick);
            assert!(state.progress.running.len() <= max);
        }
    }

    #[test]
    fn prop_topology_strategy_never_runs_adjacent_hosts(
        size in 5i64..12,
        ops in prop::collection::vec((any::<u8>(), any::<u8>()), 0..64)
    ) {
        let (topology, graph) = ring(size);
        let mut state = State::new(
            topology, Strategy::Topology, Some(graph.clone()), true, true, None, None, None,
            false,
        );
        for (op, pick) in ops {
            state = step(state, op, pick);
            for a in &state.progress.running {
                for b in &state.progress.running {
                    if a != b {
                        assert!(
                            !graph.neighbors(a).contains(b),
                            "adjacent hosts running simultaneously"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn prop_serial_flags_bound_partitions(
        cluster_parallel in any::<bool>(),
        dc_parallel in any::<bool>(),
        ops in prop::collection::vec((any::<u8>(), any::<u8>()), 0..64)
    ) {
        let mut state = State::new(
            fixed_topology(), Strategy::All, None, cluster_parallel, dc_parallel, None, None,
            None, false,
        );
        for (op, pick) in ops {
            state = step(state, op, pick);
            let clusters: HashSet<&str> = state
                .progress
                .running
                .iter()
                .map(|h| h.cluster.as_str())
                .collect();
            let dcs: HashSet<(&str, &str)> = state
                .progress
                .running
                .iter()
                .map(|h| (h.cluster.as_str(), h.dc.as_str()))
                .collect();
            if !cluster_parallel {
                assert!(clusters.len() <= 1);
            }
            if !dc_parallel {
                assert!(dcs.len() <= 1);
            }
        }
    }

    #[test]
    fn prop_stop_after_bounds_dispatch_forever(
        stop_after in 1usize..10,
        ops in prop::collection::vec((any::<u8>(), any::<u8>()), 0..64)
    ) {
        let mut state = State::new(
            fixed_topology(), Strategy::All, None, true, true, None, None, Some(stop_after),
            false,
        );
        let mut reached = false;
        for (op, pick) in ops {
            state = step(state, op, pick);
            assert!(state.progress.touched() <= stop_after);
            if state.progress.touched() >= stop_after {
                reached = true;
            }
            if reached {
                // Once the budget is hit, nothing new is ever dispatched.
                let before = state.progress.touched();
                if let Some(_h) = state.find_next_host().unwrap() {
                    panic!("dispatch after stop_after was reached");
                }
                assert_eq!(state.progress.touched(), before);
            }
        }
    }
}
