use ringleader::core::adjacency::{self, AdjacencyGraph, CacheKey};
use ringleader::core::nodetool::TokenRange;
use ringleader::core::topology::{Host, Topology};
use std::collections::BTreeSet;

fn host(ip: &str, dc: &str, token: i64) -> Host {
    Host {
        fqdn: format!("node-{ip}"),
        ip: ip.to_string(),
        dc: dc.to_string(),
        cluster: "cluster1".to_string(),
        rack: "rac1".to_string(),
        is_up: true,
        token: Some(token),
        host_id: None,
    }
}

fn range(endpoints: &[&str]) -> TokenRange {
    TokenRange {
        start_token: "0".to_string(),
        end_token: "1".to_string(),
        endpoints: endpoints.iter().map(|s| s.to_string()).collect(),
    }
}

fn identity(name: &str) -> Result<String, ringleader::core::RingleaderError> {
    Ok(name.to_string())
}

#[test]
fn test_from_ranges_symmetric() {
    let topology = Topology::new([
        host("10.0.0.1", "eu", 0),
        host("10.0.0.2", "eu", 100),
        host("10.0.0.3", "eu", 200),
    ]);
    let ranges = [range(&["10.0.0.1", "10.0.0.2"]), range(&["10.0.0.2", "10.0.0.3"])];
    let graph = AdjacencyGraph::from_ranges(&ranges, &topology, identity).unwrap();

    for (h, friends) in graph.iter() {
        for friend in friends {
            assert!(graph.neighbors(friend).contains(h));
        }
    }
    let h1 = topology.get_host("10.0.0.1").unwrap();
    let h2 = topology.get_host("10.0.0.2").unwrap();
    let h3 = topology.get_host("10.0.0.3").unwrap();
    assert!(graph.neighbors(&h1).contains(&h2));
    assert!(!graph.neighbors(&h1).contains(&h3));
    assert_eq!(graph.neighbors(&h2).len(), 2);
}

#[test]
fn test_cross_datacenter_pairs_are_dropped() {
    let topology = Topology::new([host("10.0.0.1", "eu", 0), host("10.0.0.2", "us", 100)]);
    let ranges = [range(&["10.0.0.1", "10.0.0.2"])];
    let graph = AdjacencyGraph::from_ranges(&ranges, &topology, identity).unwrap();

    let h1 = topology.get_host("10.0.0.1").unwrap();
    let h2 = topology.get_host("10.0.0.2").unwrap();
    assert!(graph.neighbors(&h1).is_empty());
    assert!(graph.neighbors(&h2).is_empty());
}

#[test]
fn test_isolated_hosts_get_empty_entries() {
    let topology = Topology::new([host("10.0.0.1", "eu", 0), host("10.0.0.9", "eu", 900)]);
    let ranges = [range(&["10.0.0.1"])];
    let graph = AdjacencyGraph::from_ranges(&ranges, &topology, identity).unwrap();
    assert_eq!(graph.len(), 2);
    let isolated = topology.get_host("10.0.0.9").unwrap();
    assert!(graph.neighbors(&isolated).is_empty());
}

#[test]
fn test_merge_unions_keyspaces() {
    let topology = Topology::new([
        host("10.0.0.1", "eu", 0),
        host("10.0.0.2", "eu", 100),
        host("10.0.0.3", "eu", 200),
    ]);
    let ks1 = AdjacencyGraph::from_ranges(&[range(&["10.0.0.1", "10.0.0.2"])], &topology, identity)
        .unwrap();
    let ks2 = AdjacencyGraph::from_ranges(&[range(&["10.0.0.1", "10.0.0.3"])], &topology, identity)
        .unwrap();
    let merged = AdjacencyGraph::merge([ks1, ks2]);

    let h1 = topology.get_host("10.0.0.1").unwrap();
    assert_eq!(merged.neighbors(&h1).len(), 2);
}

#[test]
fn test_unknown_endpoint_is_an_error() {
    let topology = Topology::new([host("10.0.0.1", "eu", 0)]);
    let ranges = [range(&["10.0.0.1", "10.9.9.9"])];
    assert!(AdjacencyGraph::from_ranges(&ranges, &topology, identity).is_err());
}

#[test]
fn test_cache_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let topology = Topology::new([
        host("10.0.0.1", "eu", 0),
        host("10.0.0.2", "eu", 100),
        host("10.0.0.3", "eu", 200),
    ]);
    let ranges = [range(&["10.0.0.1", "10.0.0.2", "10.0.0.3"])];
    let graph = AdjacencyGraph::from_ranges(&ranges, &topology, identity).unwrap();

    let key = CacheKey {
        schema_versions: BTreeSet::from(["48fc7f6b-b59d-3ed8-bc63-6e09b575651a".to_string()]),
        topology_hashes: BTreeSet::from([topology.hash()]),
    };
    adjacency::store_cached(dir.path(), &key, &graph).unwrap();

    let loaded = adjacency::load_cached(dir.path(), &key, &topology).unwrap();
    assert_eq!(loaded.len(), graph.len());
    for (h, friends) in graph.iter() {
        assert_eq!(loaded.neighbors(h), friends);
    }
}

#[test]
fn test_cache_miss_on_different_key() {
    let dir = tempfile::tempdir().unwrap();
    let topology = Topology::new([host("10.0.0.1", "eu", 0)]);
    let key = CacheKey {
        schema_versions: BTreeSet::from(["a".to_string()]),
        topology_hashes: BTreeSet::from([topology.hash()]),
    };
    assert!(adjacency::load_cached(dir.path(), &key, &topology).is_none());
}

#[test]
fn test_cache_stale_when_topology_changed() {
    // A cached graph that references hosts no longer in the topology is a miss.
    let dir = tempfile::tempdir().unwrap();
    let old_topology = Topology::new([host("10.0.0.1", "eu", 0), host("10.0.0.2", "eu", 100)]);
    let ranges = [range(&["10.0.0.1", "10.0.0.2"])];
    let graph = AdjacencyGraph::from_ranges(&ranges, &old_topology, identity).unwrap();
    let key = CacheKey {
        schema_versions: BTreeSet::from(["a".to_string()]),
        topology_hashes: BTreeSet::from([old_topology.hash()]),
    };
    adjacency::store_cached(dir.path(), &key, &graph).unwrap();

    let new_topology = Topology::new([host("10.0.0.1", "eu", 0)]);
    assert!(adjacency::load_cached(dir.path(), &key, &new_topology).is_none());
}
