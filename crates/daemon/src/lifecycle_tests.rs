// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;
use yare::parameterized;

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |var| vars.get(var).cloned()
}

#[test]
fn defaults_without_file_or_env() {
    let config = Config::load(None, env_of(&[])).unwrap();

    assert_eq!(config, Config::default());
    assert_eq!(config.bucket, "process_locks");
    assert_eq!(config.keys, vec!["lock.1".to_string()]);
    assert_eq!(config.ttl, Duration::from_secs(30));
    assert!(config.hold_for.is_none());
    assert_eq!(config.log, "info");
}

#[test]
fn env_overrides_defaults() {
    let config = Config::load(
        None,
        env_of(&[
            ("NLOCK_BUCKET", "jobs"),
            ("NLOCK_KEYS", "lock.a, lock.b,,"),
            ("NLOCK_TTL", "4s"),
            ("NLOCK_OWNER", "worker-7"),
            ("NLOCK_HOLD_FOR", "1m 30s"),
            ("NLOCK_LOG", "debug"),
            ("NLOCK_LOG_PATH", "/tmp/nlockd.log"),
        ]),
    )
    .unwrap();

    assert_eq!(config.bucket, "jobs");
    assert_eq!(config.keys, vec!["lock.a".to_string(), "lock.b".to_string()]);
    assert_eq!(config.ttl, Duration::from_secs(4));
    assert_eq!(config.owner_token().as_str(), "worker-7");
    assert_eq!(config.hold_for, Some(Duration::from_secs(90)));
    assert_eq!(config.log, "debug");
    assert_eq!(config.log_path, Some(PathBuf::from("/tmp/nlockd.log")));
    assert_eq!(config.lock_config().heartbeat_interval(), Duration::from_secs(2));
}

#[parameterized(
    unparsable_ttl = { "NLOCK_TTL", "soon" },
    zero_ttl = { "NLOCK_TTL", "0s" },
    unparsable_hold = { "NLOCK_HOLD_FOR", "later" },
    no_keys = { "NLOCK_KEYS", " , " },
    empty_owner = { "NLOCK_OWNER", "" },
    empty_bucket = { "NLOCK_BUCKET", "" },
)]
fn invalid_env_names_the_variable(var: &str, value: &str) {
    let err = Config::load(None, env_of(&[(var, value)])).unwrap_err();

    match err {
        LifecycleError::Config { var: named, .. } => assert_eq!(named, var),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn file_layer_sits_between_defaults_and_env() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nlockd.toml");
    std::fs::write(
        &path,
        r#"
bucket = "from-file"
keys = ["lock.x", "lock.y"]
ttl = "10s"
hold_for = "2s"
"#,
    )
    .unwrap();

    let config = Config::load(Some(&path), env_of(&[("NLOCK_BUCKET", "from-env")])).unwrap();

    assert_eq!(config.bucket, "from-env");
    assert_eq!(config.keys, vec!["lock.x".to_string(), "lock.y".to_string()]);
    assert_eq!(config.ttl, Duration::from_secs(10));
    assert_eq!(config.hold_for, Some(Duration::from_secs(2)));
    assert_eq!(config.log, "info", "unset fields keep defaults");
}

#[test]
fn missing_config_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let err = Config::load(Some(&path), env_of(&[])).unwrap_err();

    assert!(matches!(err, LifecycleError::ConfigRead(ref p, _) if p == &path));
}

#[test]
fn malformed_config_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "ttl = [").unwrap();

    let err = Config::load(Some(&path), env_of(&[])).unwrap_err();

    assert!(matches!(err, LifecycleError::ConfigParse(..)));
}

#[tokio::test]
async fn startup_claims_every_key_and_shutdown_releases() {
    let config = Config {
        keys: vec!["lock.2".to_string(), "lock.1".to_string()],
        owner: Some("owner-a".to_string()),
        ..Config::default()
    };

    let daemon = startup(&config).await.unwrap();

    assert!(daemon.pending.is_empty());
    assert_eq!(daemon.manager.len(), 2);
    let lock = daemon.manager.get("lock.1").unwrap();
    assert!(lock.has_acquisition());
    assert_eq!(lock.owner().as_str(), "owner-a");

    let released = daemon.shutdown().await;
    assert_eq!(released, vec!["lock.1".to_string(), "lock.2".to_string()]);
    assert!(!lock.has_acquisition());
}

#[tokio::test]
async fn duplicate_key_fails_startup() {
    let config = Config {
        keys: vec!["lock.1".to_string(), "lock.1".to_string()],
        owner: Some("owner-a".to_string()),
        ..Config::default()
    };

    let err = startup(&config).await.err().unwrap();

    assert!(matches!(
        err,
        LifecycleError::Claim {
            source: LockError::AlreadyClaimedLocally(_),
            ..
        }
    ));
}
