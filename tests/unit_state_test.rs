use ringleader::core::state::State;
use ringleader::core::strategy::Strategy;
use ringleader::core::topology::{Host, Topology};

fn host(ip: &str, is_up: bool) -> Host {
    Host {
        fqdn: format!("host-{ip}"),
        ip: ip.to_string(),
        dc: "eu".to_string(),
        cluster: "cluster1".to_string(),
        rack: "rac1".to_string(),
        is_up,
        token: Some(ip.split('.').next_back().unwrap().parse::<i64>().unwrap() * 100),
        host_id: None,
    }
}

fn make_state(hosts: Vec<Host>) -> State {
    State::new(
        Topology::new(hosts),
        Strategy::All,
        None,
        true,
        true,
        None,
        None,
        None,
        false,
    )
}

#[test]
fn test_is_done_when_all_hosts_finished() {
    let h1 = host("1.2.3.1", true);
    let h2 = host("1.2.3.2", true);
    let mut state = make_state(vec![h1.clone(), h2.clone()]);
    assert!(!state.is_done());

    state = state.with_running(h1.clone()).with_running(h2.clone());
    assert!(!state.is_done());

    state = state.with_done(h1).with_done(h2);
    assert!(state.is_done());
}

#[test]
fn test_is_done_on_stop_after() {
    let hosts: Vec<Host> = (1..=4).map(|i| host(&format!("1.2.3.{i}"), true)).collect();
    let mut state = State::new(
        Topology::new(hosts.clone()),
        Strategy::All,
        None,
        true,
        true,
        None,
        None,
        Some(2),
        false,
    );
    assert!(!state.is_done());
    state = state.with_done(hosts[0].clone()).with_running(hosts[1].clone());
    assert!(state.is_done());
}

#[test]
fn test_unhealthy_when_idle_host_is_down() {
    let up = host("1.2.3.1", true);
    let down = host("1.2.3.2", false);
    let state = make_state(vec![up, down]);
    assert!(!state.is_healthy());
}

#[test]
fn test_healthy_when_down_host_is_our_own_runner() {
    // A down host that we are executing on is self-inflicted down-ness.
    let up = host("1.2.3.1", true);
    let down = host("1.2.3.2", false);
    let state = make_state(vec![up, down.clone()]).with_running(down);
    assert!(state.is_healthy());
}

#[test]
fn test_healthy_when_ignoring_down_nodes() {
    let down = host("1.2.3.2", false);
    let state = State::new(
        Topology::new(vec![down]),
        Strategy::All,
        None,
        true,
        true,
        None,
        None,
        None,
        true,
    );
    assert!(state.is_healthy());
}

#[test]
fn test_dispatch_proceeds_when_down_host_is_running() {
    // Scenario: the only down host is already in running; the next pick
    // must succeed rather than failing with HostIsDown.
    let up = host("1.2.3.1", true);
    let down = host("1.2.3.2", false);
    let state = make_state(vec![up.clone(), down.clone()]).with_running(down);
    assert!(state.is_healthy());
    let next = state.find_next_host().unwrap();
    assert_eq!(next, Some(up));
}

#[test]
fn test_get_idle() {
    let h1 = host("1.2.3.1", true);
    let h2 = host("1.2.3.2", true);
    let state = make_state(vec![h1.clone(), h2.clone()]).with_running(h1);
    let idle = state.get_idle();
    assert_eq!(idle.len(), 1);
    assert!(idle.contains(&h2));
}

#[test]
fn test_current_topology_defaults_to_original() {
    let h1 = host("1.2.3.1", true);
    let state = make_state(vec![h1]);
    assert_eq!(state.original_topology, state.current_topology);
}

#[test]
fn test_with_topology_replaces_current_only() {
    let h1 = host("1.2.3.1", true);
    let h2 = host("1.2.3.2", true);
    let state = make_state(vec![h1.clone()]);
    let refreshed = state.with_topology(Topology::new(vec![h1, h2]));
    assert_eq!(refreshed.original_topology.len(), 1);
    assert_eq!(refreshed.current_topology.len(), 2);
}
