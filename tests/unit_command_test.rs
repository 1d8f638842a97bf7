use ringleader::core::RingleaderError;
use ringleader::core::command::{list, parse};
use ringleader::core::strategy::Strategy;
use std::path::Path;

const DEFINITION: &str = "\
#!/usr/bin/env bash
# C* cluster-parallel: true
# C* dc-parallel: false
# C* strategy: one
# C* description: Restart one node after draining it
# C* argument: {\"option\":\"--wait-time\", \"name\":\"WAIT_TIME\", \"description\":\"seconds to wait\", \"default\":\"60\"}
# C* argument: {\"option\":\"--snapshot-name\", \"name\":\"SNAPSHOT_NAME\", \"description\":\"snapshot to take\", \"required\":true}

nodetool drain && sudo service cassandra restart
";

#[test]
fn test_parse_properties() {
    let command = parse("restart", Path::new("/tmp/restart.sh"), DEFINITION).unwrap();
    assert_eq!(command.name, "restart");
    assert_eq!(command.cluster_parallel, Some(true));
    assert_eq!(command.dc_parallel, Some(false));
    assert_eq!(command.strategy, Some(Strategy::One));
    assert_eq!(
        command.description.as_deref(),
        Some("Restart one node after draining it")
    );
}

#[test]
fn test_parse_arguments() {
    let command = parse("restart", Path::new("/tmp/restart.sh"), DEFINITION).unwrap();
    assert_eq!(command.arguments.len(), 2);

    let wait = &command.arguments[0];
    assert_eq!(wait.option, "--wait-time");
    assert_eq!(wait.name, "WAIT_TIME");
    assert_eq!(wait.default.as_deref(), Some("60"));
    assert!(!wait.required);

    let snapshot = &command.arguments[1];
    assert_eq!(snapshot.name, "SNAPSHOT_NAME");
    assert!(snapshot.required);
    assert_eq!(snapshot.default, None);
}

#[test]
fn test_parse_stops_at_first_non_comment_line() {
    let definition = "# C* description: above\necho hi\n# C* strategy: all\n";
    let command = parse("x", Path::new("/tmp/x"), definition).unwrap();
    assert_eq!(command.description.as_deref(), Some("above"));
    // The strategy property after the code line is never seen.
    assert_eq!(command.strategy, None);
}

#[test]
fn test_parse_defaults_when_no_properties() {
    let command = parse("plain", Path::new("/tmp/plain"), "echo hi\n").unwrap();
    assert_eq!(command.strategy, None);
    assert_eq!(command.cluster_parallel, None);
    assert_eq!(command.dc_parallel, None);
    assert!(command.arguments.is_empty());
}

#[test]
fn test_bad_environment_variable_name() {
    let definition = "# C* argument: {\"option\":\"--x\", \"name\":\"BAD-NAME\", \"description\":\"nope\"}\n";
    assert!(matches!(
        parse("x", Path::new("/tmp/x"), definition),
        Err(RingleaderError::BadEnvironmentVariable(name)) if name == "BAD-NAME"
    ));
}

#[test]
fn test_bad_strategy_is_rejected() {
    let definition = "# C* strategy: yolo\n";
    assert!(parse("x", Path::new("/tmp/x"), definition).is_err());
}

#[test]
fn test_list_skips_backups_and_strips_extensions() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("restart.sh"), "echo hi").unwrap();
    std::fs::write(dir.path().join("upgrade"), "echo hi").unwrap();
    std::fs::write(dir.path().join("restart.sh~"), "backup").unwrap();
    std::fs::write(dir.path().join("#restart.sh#"), "lock").unwrap();

    let commands = list(&[dir.path().to_path_buf()]);
    let names: Vec<&String> = commands.keys().collect();
    assert_eq!(names, vec!["restart", "upgrade"]);
    assert_eq!(commands["restart"], dir.path().join("restart.sh"));
}

#[test]
fn test_list_first_directory_wins() {
    let high = tempfile::tempdir().unwrap();
    let low = tempfile::tempdir().unwrap();
    std::fs::write(high.path().join("restart.sh"), "priority").unwrap();
    std::fs::write(low.path().join("restart.sh"), "fallback").unwrap();
    std::fs::write(low.path().join("other.sh"), "only here").unwrap();

    let commands = list(&[high.path().to_path_buf(), low.path().to_path_buf()]);
    assert_eq!(commands["restart"], high.path().join("restart.sh"));
    assert_eq!(commands["other"], low.path().join("other.sh"));
}

#[test]
fn test_missing_directory_is_ignored() {
    let commands = list(&[Path::new("/definitely/not/here").to_path_buf()]);
    assert!(commands.is_empty());
}
