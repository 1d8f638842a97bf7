// tests/property/structure_test.rs

//! Structural invariants: hash stability and adjacency symmetry.

use proptest::prelude::*;
use ringleader::core::adjacency::AdjacencyGraph;
use ringleader::core::nodetool::TokenRange;
use ringleader::core::topology::{Host, Topology};

fn host(i: usize, dc: &str) -> Host {
    Host {
        fqdn: format!("node{i}.example.com"),
        ip: format!("10.0.{}.{}", if dc == "eu" { 1 } else { 2 }, i),
        dc: dc.to_string(),
        cluster: "cluster1".to_string(),
        rack: "rac1".to_string(),
        is_up: true,
        token: Some(i as i64 * 100),
        host_id: Some(format!("00000000-0000-4000-8000-{i:012}")),
    }
}

fn identity(name: &str) -> Result<String, ringleader::core::RingleaderError> {
    Ok(name.to_string())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    #[test]
    fn prop_hash_is_insertion_order_independent(
        size in 2usize..12,
        seed in any::<u64>(),
    ) {
        let mut hosts: Vec<Host> = (0..size).map(|i| host(i, "eu")).collect();
        let reference = Topology::new(hosts.clone()).hash();

        // A cheap deterministic shuffle driven by the seed.
        let mut s = seed;
        for i in (1..hosts.len()).rev() {
            s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            hosts.swap(i, (s as usize) % (i + 1));
        }
        prop_assert_eq!(Topology::new(hosts).hash(), reference);
    }

    #[test]
    fn prop_hash_survives_serialization(size in 2usize..12) {
        let topology = Topology::new((0..size).map(|i| host(i, "eu")));
        let json = serde_json::to_string(&topology).unwrap();
        let parsed: Topology = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed.hash(), topology.hash());
        prop_assert_eq!(parsed, topology);
    }

    #[test]
    fn prop_hash_differs_for_different_hosts(
        size in 2usize..10,
        extra in 100usize..110,
    ) {
        let base = Topology::new((0..size).map(|i| host(i, "eu")));
        let grown = Topology::new((0..size).map(|i| host(i, "eu")).chain([host(extra, "eu")]));
        prop_assert_ne!(base.hash(), grown.hash());
    }

    #[test]
    fn prop_adjacency_is_symmetric_within_a_dc(
        size in 2usize..8,
        range_specs in prop::collection::vec(
            prop::collection::vec(0usize..8, 2..4),
            1..6
        ),
    ) {
        let topology = Topology::new((0..size).map(|i| host(i, "eu")));
        let ranges: Vec<TokenRange> = range_specs
            .iter()
            .map(|endpoints| TokenRange {
                start_token: "0".to_string(),
                end_token: "1".to_string(),
                endpoints: endpoints
                    .iter()
                    .map(|i| format!("10.0.1.{}", i % size))
                    .collect(),
            })
            .collect();
        let graph = AdjacencyGraph::from_ranges(&ranges, &topology, identity).unwrap();

        for (a, friends) in graph.iter() {
            for b in friends {
                prop_assert!(graph.neighbors(b).contains(a), "asymmetric edge");
                prop_assert_eq!(&a.dc, &b.dc);
            }
        }
    }

    #[test]
    fn prop_adjacency_never_crosses_dcs(
        eu_count in 1usize..5,
        us_count in 1usize..5,
    ) {
        let hosts: Vec<Host> = (0..eu_count)
            .map(|i| host(i, "eu"))
            .chain((0..us_count).map(|i| host(i + 16, "us")))
            .collect();
        let topology = Topology::new(hosts.clone());

        // One big range replicated across every host in both dcs.
        let ranges = [TokenRange {
            start_token: "0".to_string(),
            end_token: "1".to_string(),
            endpoints: hosts.iter().map(|h| h.ip.clone()).collect(),
        }];
        let graph = AdjacencyGraph::from_ranges(&ranges, &topology, identity).unwrap();

        for (a, friends) in graph.iter() {
            for b in friends {
                prop_assert_eq!(&a.dc, &b.dc);
            }
        }
    }
}
