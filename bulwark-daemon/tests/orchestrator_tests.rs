//! Orchestrator and replay tests.
//!
//! Builds a real node directory in a temp dir, assembles the daemon from a
//! parsed `BulwarkConfig`, and replays in-memory input through it.

use std::path::Path;

use bulwark_core::config::BulwarkConfig;
use bulwark_daemon::orchestrator::{Orchestrator, validate_config};
use bulwark_daemon::replay::replay;
use tokio_util::sync::CancellationToken;

const SYSLOG_NODE: &str = r#"
grok:
  pattern: '^(?P<host>\S+) (?P<program>[\w-]+): (?P<message>.*)$'
on_success: next_stage
"#;

const SSHD_NODE: &str = r#"
filter: 'evt.Parsed.program == "sshd"'
grok:
  pattern: 'Failed password for (?P<user>\S+) from (?P<source_ip>[\d.]+)'
  apply_on: message
statics:
  - meta: log_type
    value: ssh_failed-auth
  - meta: source_ip
    expression: evt.Parsed.source_ip
"#;

async fn write_nodes(root: &Path) {
    tokio::fs::create_dir_all(root.join("s00-raw")).await.unwrap();
    tokio::fs::create_dir_all(root.join("s01-parse")).await.unwrap();
    tokio::fs::write(root.join("s00-raw/syslog.yaml"), SYSLOG_NODE)
        .await
        .unwrap();
    tokio::fs::write(root.join("s01-parse/sshd.yaml"), SSHD_NODE)
        .await
        .unwrap();
}

fn config_for(root: &Path, dump_path: Option<&Path>) -> BulwarkConfig {
    let mut config = BulwarkConfig::default();
    config.parser.config_dir = root.display().to_string();
    if let Some(path) = dump_path {
        config.parser.dump = true;
        config.parser.dump_path = path.display().to_string();
    }
    config
}

const INPUT: &str = "bastion sshd: Failed password for root from 203.0.113.9 port 22\n\
                     \n\
                     bastion cron: job finished\r\n\
                     garbage-without-program\n";

#[tokio::test]
async fn test_replay_emits_only_processed_events() {
    // Given: a two-stage node directory
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("parsers");
    write_nodes(&root).await;
    let orchestrator = Orchestrator::build_from_config(config_for(&root, None))
        .await
        .expect("orchestrator should build");
    assert_eq!(orchestrator.pipeline().stages(), ["s00-raw", "s01-parse"]);

    // When: replaying three non-empty lines
    let mut output = Vec::new();
    let stats = orchestrator
        .run(INPUT.as_bytes(), &mut output)
        .await
        .unwrap();

    // Then: only the sshd line reaches the output
    assert_eq!(stats.read, 3);
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.dropped, 2);
    assert_eq!(stats.failed, 0);

    let text = String::from_utf8(output).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 1);
    let event: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(event["process"], true);
    assert_eq!(event["stage"], "s01-parse");
    assert_eq!(event["meta"]["source_ip"], "203.0.113.9");
    assert_eq!(event["meta"]["log_type"], "ssh_failed-auth");
}

#[tokio::test]
async fn test_run_writes_stage_dump() {
    // Given: dump enabled
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("parsers");
    let dump_path = dir.path().join("out/dump.json");
    write_nodes(&root).await;
    tokio::fs::create_dir_all(dump_path.parent().unwrap())
        .await
        .unwrap();
    let orchestrator = Orchestrator::build_from_config(config_for(&root, Some(&dump_path)))
        .await
        .unwrap();

    // When
    orchestrator
        .run(INPUT.as_bytes(), tokio::io::sink())
        .await
        .unwrap();

    // Then: the dump names both stages
    let dump = tokio::fs::read_to_string(&dump_path).await.unwrap();
    assert!(dump.contains("s00-raw"));
    assert!(dump.contains("s01-parse"));
}

#[tokio::test]
async fn test_cancelled_replay_reads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("parsers");
    write_nodes(&root).await;
    let orchestrator = Orchestrator::build_from_config(config_for(&root, None))
        .await
        .unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let stats = replay(
        orchestrator.pipeline(),
        INPUT.as_bytes(),
        tokio::io::sink(),
        &token,
    )
    .await
    .unwrap();
    assert_eq!(stats.read, 0);
}

#[tokio::test]
async fn test_bad_node_file_fails_startup() {
    // Given: a node with a malformed regex
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("parsers");
    tokio::fs::create_dir_all(root.join("s00-raw")).await.unwrap();
    tokio::fs::write(root.join("s00-raw/bad.yaml"), "grok:\n  pattern: '(unclosed'\n")
        .await
        .unwrap();

    // When / Then
    let result = Orchestrator::build_from_config(config_for(&root, None)).await;
    let err = result.err().expect("build should fail");
    assert!(err.to_string().contains("failed to build stage pipeline"));
}

#[tokio::test]
async fn test_missing_config_dir_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator =
        Orchestrator::build_from_config(config_for(&dir.path().join("absent"), None)).await;
    assert!(orchestrator.is_err());
}

#[test]
fn test_validate_config_returns_sync_settings() {
    // Given: papi enabled with console management
    let mut config = BulwarkConfig::parse(
        r#"
[papi]
enabled = true
subscription = "enterprise"
sync_interval_secs = 30

[console]
console_management = true
"#,
    )
    .unwrap();

    // When
    let sync = validate_config(&config).unwrap().expect("papi enabled");

    // Then
    assert_eq!(sync.sync_interval_secs, 30);
    assert!(sync.subscription.can_poll());
    assert!(sync.shares_deletions());

    config.papi.enabled = false;
    assert!(validate_config(&config).unwrap().is_none());
}

#[test]
fn test_validate_config_rejects_unknown_tier() {
    let config = BulwarkConfig::parse(
        r#"
[papi]
enabled = true
subscription = "gold"
"#,
    )
    .unwrap();
    assert!(validate_config(&config).is_err());
}
