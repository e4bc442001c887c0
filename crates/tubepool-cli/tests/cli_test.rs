//! E2E tests for the tubepool binary
//!
//! Each test gets an isolated sync root and a config passed with --config.
//! Fetching is done by a small shell script standing in for the downloader.

use std::path::Path;
use std::process::{Command, Output};
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use tubepool_config::testing::TestEnvironment;
use tubepool_config::Config;
use tubepool_store::Subscriber;

fn tubepool(env: &TestEnvironment, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tubepool"))
        .arg("--config")
        .arg(env.config_path())
        .args(args)
        .current_dir(&env.root)
        .env_remove("TUBEPOOL_SYNC_ROOT")
        .env_remove("TUBEPOOL_CAPACITY_BYTES")
        .env_remove("TUBEPOOL_RELEVANCE_DAYS")
        .env_remove("TUBEPOOL_CONFIG")
        .output()
        .expect("Failed to execute tubepool")
}

/// Config whose fetch command writes `<title>.mp4` and logs each call.
/// Titles starting with "broken" fail.
fn fetching_config(env: &TestEnvironment) -> Config {
    let mut config = env.config(vec![
        Subscriber::new("alice", ["UC_x", "UC_shared"]),
        Subscriber::new("bob", ["UC_y", "UC_shared"]),
    ]);
    let calls = env.root.join("fetch-calls");
    let script = format!(
        r#"echo "$2" >> "{}"
case "$3" in broken*) echo "stream unavailable" >&2; exit 1;; esac
printf '%s' "$2" > "$1/$3.mp4"
echo "$1/$3.mp4""#,
        calls.display()
    );
    config.fetch.command = ["sh", "-c", &script, "sh", "{pool}", "{id}", "{title}"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    config.fetch.timeout_secs = 30;
    config
}

fn write_worklist(env: &TestEnvironment, json: &str) -> String {
    let path = env.root.join("items.json");
    std::fs::write(&path, json).unwrap();
    path.to_string_lossy().into_owned()
}

fn fetch_calls(env: &TestEnvironment) -> Vec<String> {
    std::fs::read_to_string(env.root.join("fetch-calls"))
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

fn exists(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

#[test]
fn e2e_config_show_returns_valid_toml() {
    let env = TestEnvironment::new().unwrap();
    env.write_config(&env.config(vec![Subscriber::new("alice", ["UC1"])]))
        .unwrap();

    let output = tubepool(&env, &["config", "show"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());

    let parsed: Config = toml::from_str(&stdout).expect("config show should return valid TOML");
    assert_eq!(parsed.storage.sync_root, env.sync_root);
    assert_eq!(parsed.subscribers.len(), 1);
}

#[test]
fn e2e_run_fetches_links_and_never_refetches() {
    let env = TestEnvironment::new().unwrap();
    env.write_config(&fetching_config(&env)).unwrap();
    let worklist = write_worklist(
        &env,
        r#"[
            {"id": "x1", "title": "Only Alice", "channel": "UC_x"},
            {"id": "s1", "title": "Both", "channel": "UC_shared"},
            {"id": "b1", "title": "broken upload", "channel": "UC_y"}
        ]"#,
    );

    let output = tubepool(&env, &["run", "--worklist", &worklist]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("2 archived"), "{}", stdout);
    assert!(stdout.contains("b1"), "{}", stdout);

    assert!(exists(&env.pool_dir().join("Only Alice.mp4")));
    assert!(exists(&env.namespace_dir("alice").join("Only Alice.mp4")));
    assert!(!exists(&env.namespace_dir("bob").join("Only Alice.mp4")));
    assert!(exists(&env.namespace_dir("alice").join("Both.mp4")));
    assert!(exists(&env.namespace_dir("bob").join("Both.mp4")));
    assert_eq!(env.ledger_ids().unwrap(), vec!["x1", "s1"]);

    let log = std::fs::read_to_string(&env.log_path).unwrap();
    assert!(log.contains("Archived"));
    assert!(log.contains("broken upload"));
    assert!(log.contains("stay unarchived"), "{}", log);

    // Second run: archived items are skipped, the failed one is retried
    let output = tubepool(&env, &["run", "--worklist", &worklist]);
    assert!(output.status.success());
    assert_eq!(fetch_calls(&env), vec!["x1", "s1", "b1", "b1"]);
}

#[test]
fn e2e_reserved_subscriber_name_is_fatal() {
    let env = TestEnvironment::new().unwrap();
    env.write_config(&env.config(vec![Subscriber::new("pool", ["UC1"])]))
        .unwrap();
    let worklist = write_worklist(&env, "[]");

    let output = tubepool(&env, &["run", "--worklist", &worklist]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("pool"));
    assert!(!env.sync_root.exists());
    assert!(!env.ledger_path.exists());
    assert!(!env.log_path.exists());
}

#[test]
fn e2e_reclaim_dry_run_keeps_files() {
    let env = TestEnvironment::new().unwrap();
    env.write_config(&env.config(vec![Subscriber::new("alice", ["UC1"])]))
        .unwrap();
    let old = env.create_pool_file("Old.mp4", b"old video").unwrap();
    env.link("alice", "Old.mp4").unwrap();
    let month_ago = SystemTime::now() - Duration::from_secs(30 * 24 * 3600);
    filetime::set_file_mtime(&old, FileTime::from_system_time(month_ago)).unwrap();

    let output = tubepool(&env, &["reclaim", "--dry-run"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("aged-out"), "{}", stdout);
    assert!(exists(&old));

    let output = tubepool(&env, &["reclaim"]);
    assert!(output.status.success());
    assert!(!exists(&old));
    assert!(!exists(&env.namespace_dir("alice").join("Old.mp4")));
}

#[test]
fn e2e_status_reports_pool() {
    let env = TestEnvironment::new().unwrap();
    env.write_config(&env.config(vec![Subscriber::new("alice", ["UC1"])]))
        .unwrap();
    env.create_pool_file("A.mp4", b"aaaa").unwrap();
    env.link("alice", "A.mp4").unwrap();

    let output = tubepool(&env, &["status"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("1 entries"), "{}", stdout);
    assert!(stdout.contains("alice"));
}
