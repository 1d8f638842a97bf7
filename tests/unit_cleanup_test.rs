use ringleader::core::job::cleanup::cleanup_jobs;
use ringleader::core::job::journal::{self, FILE_FORMAT_VERSION, JournalDocument, StateDocument};
use ringleader::core::strategy::Strategy;
use ringleader::remote::SshLib;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

fn make_document(age_days: i64) -> JournalDocument {
    JournalDocument {
        version: FILE_FORMAT_VERSION,
        creation_timestamp: chrono::Utc::now().timestamp() - age_days * 86_400,
        command: PathBuf::from("/tmp/command"),
        env: HashMap::new(),
        timeout: None,
        key_space: None,
        sleep_on_new_runner: Duration::from_millis(500),
        sleep_after_done: Duration::ZERO,
        ssh_username: None,
        ssh_identity_file: None,
        ssh_lib: SshLib::Openssh,
        jmx_username: None,
        hosts_variables: HashMap::new(),
        local: false,
        state: StateDocument {
            strategy: Strategy::All,
            cluster_parallel: false,
            dc_parallel: false,
            max_concurrency: None,
            ignore_down_nodes: false,
            original_topology: vec![],
            current_topology: vec![],
            done: vec![],
            running: vec![],
            failed: vec![],
        },
    }
}

#[test]
fn test_cleanup_removes_old_and_broken_jobs() {
    let jobs_dir = tempfile::tempdir().unwrap();

    // A fresh job survives.
    let fresh = jobs_dir.path().join("fresh-job");
    journal::write(&make_document(0), &fresh).unwrap();

    // A stale job is deleted.
    let stale = jobs_dir.path().join("stale-job");
    journal::write(&make_document(30), &stale).unwrap();

    // A directory with a corrupt journal is deleted.
    let broken = jobs_dir.path().join("broken-job");
    std::fs::create_dir_all(&broken).unwrap();
    std::fs::write(broken.join("job.json"), "not json at all").unwrap();

    // A directory with no journal at all is deleted.
    let empty = jobs_dir.path().join("empty-job");
    std::fs::create_dir_all(&empty).unwrap();

    let mut removed = cleanup_jobs(jobs_dir.path(), 7).unwrap();
    removed.sort();
    assert_eq!(removed, vec!["broken-job", "empty-job", "stale-job"]);

    assert!(fresh.exists());
    assert!(!stale.exists());
    assert!(!broken.exists());
    assert!(!empty.exists());
}

#[test]
fn test_cleanup_of_missing_jobs_dir_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("never-created");
    assert!(cleanup_jobs(&missing, 7).unwrap().is_empty());
}
