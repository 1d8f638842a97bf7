use ringleader::core::topology::{Host, Topology};

const IP1: &str = "1.2.3.4";
const IP2: &str = "2.3.4.5";
const IP3: &str = "2.3.4.6";
const IP4: &str = "2.3.4.7";
const IP5: &str = "2.3.4.8";

fn host(fqdn: &str, ip: &str, dc: &str, cluster: &str, token: i64, host_id: &str) -> Host {
    Host {
        fqdn: fqdn.to_string(),
        ip: ip.to_string(),
        dc: dc.to_string(),
        cluster: cluster.to_string(),
        rack: "rac1".to_string(),
        is_up: true,
        token: Some(token),
        host_id: Some(host_id.to_string()),
    }
}

fn test_topology() -> Topology {
    Topology::new([
        host("a", IP1, "eu", "cluster1", 0, "host1"),
        host("b", IP2, "eu", "cluster1", 10, "host2"),
        host("c", IP3, "us", "cluster1", 1, "host3"),
        host("d", IP4, "us", "cluster1", 11, "host4"),
        host("e", IP5, "us", "cluster2", 0, "host5"),
    ])
}

fn topology_a() -> Topology {
    Topology::new([
        host("a", IP1, "eu", "cluster1", 0, "host1"),
        host("b", IP2, "eu", "cluster1", 10, "host2"),
        host("c", IP3, "us", "cluster1", 1, "host3"),
        host("d", IP4, "us", "cluster1", 11, "host4"),
    ])
}

// Same hosts as topology_a but with shifted tokens; the hash only depends
// on cluster names and host ids.
fn topology_b() -> Topology {
    Topology::new([
        host("a", IP1, "eu", "cluster1", 10, "host1"),
        host("b", IP2, "eu", "cluster1", 12, "host2"),
        host("c", IP3, "us", "cluster1", 11, "host3"),
        host("d", IP4, "us", "cluster1", 14, "host4"),
    ])
}

fn topology_c() -> Topology {
    Topology::new([
        host("a", IP1, "eu", "cluster1", 10, "host1"),
        host("b", IP2, "eu", "cluster1", 12, "host6"),
        host("c", IP3, "us", "cluster1", 11, "host3"),
        host("d", IP4, "us", "cluster1", 14, "host4"),
    ])
}

#[test]
fn test_with_dc() {
    let sub = test_topology().with_dc("cluster1", "us");
    assert_eq!(sub.len(), 2);
    for h in sub.iter() {
        assert_eq!(h.dc, "us");
        assert_eq!(h.cluster, "cluster1");
    }
}

#[test]
fn test_with_dc_keys_on_cluster_too() {
    // cluster2 also has a "us" dc; with_dc must not leak it in.
    let sub = test_topology().with_dc_filter("us");
    assert_eq!(sub.len(), 3);
    assert_eq!(test_topology().with_dc("cluster2", "us").len(), 1);
}

#[test]
fn test_with_cluster() {
    let sub = test_topology().with_cluster("cluster1");
    assert_eq!(sub.len(), 4);
    for h in sub.iter() {
        assert_eq!(h.cluster, "cluster1");
    }
}

#[test]
fn test_without_host() {
    let sub = test_topology().without_host(&host("a", IP1, "eu", "cluster1", 0, "host1"));
    assert_eq!(sub.len(), 4);
}

#[test]
fn test_without_hosts() {
    let excluded = [
        host("a", IP1, "eu", "cluster1", 0, "host1"),
        host("b", IP2, "eu", "cluster1", 10, "host2"),
    ];
    let sub = test_topology().without_hosts(excluded.iter());
    assert_eq!(sub.len(), 3);
}

#[test]
fn test_host_identity_is_ip() {
    // A host compared by ip matches another value with the same ip,
    // whatever its other fields say.
    let relabeled = host("zz", IP1, "other-dc", "other-cluster", 999, "hostX");
    assert!(test_topology().contains(&relabeled));
}

#[test]
fn test_first_is_deterministic() {
    let topology = test_topology();
    // Lowest token wins; ip breaks the tie between token-0 hosts.
    let first = topology.first().unwrap();
    assert_eq!(first.ip, IP1);
    for _ in 0..10 {
        assert_eq!(topology.first().unwrap().ip, IP1);
    }
}

#[test]
fn test_get_dcs() {
    let dcs = test_topology().get_dcs();
    assert_eq!(dcs.len(), 3);
    assert!(dcs.iter().any(|d| d.cluster == "cluster2" && d.dc == "us"));
}

#[test]
fn test_union() {
    let union = topology_a().union(&test_topology());
    assert_eq!(union.len(), 5);
}

#[test]
fn test_cluster_hash_match() {
    assert_eq!(topology_a().hash(), topology_b().hash());
    assert_eq!(topology_a().hash(), topology_a().hash());
}

#[test]
fn test_cluster_hash_no_match() {
    assert_ne!(test_topology().hash(), topology_a().hash());
    assert_ne!(topology_b().hash(), topology_c().hash());
}

#[test]
fn test_hash_survives_serialization() {
    let json = serde_json::to_string(&topology_a()).unwrap();
    let parsed: Topology = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.hash(), topology_a().hash());
    assert_eq!(parsed, topology_a());
}

#[test]
fn test_get_up_and_down() {
    let mut down = host("f", "9.9.9.9", "eu", "cluster1", 50, "host9");
    down.is_up = false;
    let topology = test_topology().union(&Topology::new([down]));
    assert_eq!(topology.get_down().len(), 1);
    assert_eq!(topology.get_up().len(), 5);
}
