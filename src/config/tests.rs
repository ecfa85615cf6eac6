use super::settings::{Settings, SnapshotBackend};
use super::{load_config, load_config_from};

use serial_test::serial;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.server.max_connections, 1000);
    assert_eq!(settings.hub.mailbox_capacity, 4);
    assert_eq!(settings.snapshot.backend, SnapshotBackend::Sled);
    assert_eq!(settings.snapshot.key_prefix, "board:snapshot:");
    assert_eq!(settings.server.handshake_timeout_ms, 10_000);
    assert_eq!(settings.snapshot.timeout_ms, 2_000);
    assert_eq!(settings.log.level, "info");
}

#[test]
#[serial]
fn test_missing_file_yields_defaults() {
    temp_env::with_vars_unset(["BOARDHUB_SERVER__PORT", "BOARDHUB_HUB__MAILBOX_CAPACITY"], || {
        let cfg = load_config_from("does/not/exist").expect("load_config failed");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.hub.mailbox_capacity, 4);
    });
}

#[test]
#[serial]
fn test_file_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("boardhub.toml");
    let toml = r#"
        [server]
        host = "0.0.0.0"
        port = 9000
        handshake_timeout_ms = 500

        [hub]
        mailbox_capacity = 16

        [snapshot]
        backend = "redis"
        redis_url = "redis://cache:6379/0"
        timeout_ms = 250
    "#;
    fs::write(&path, toml).expect("write config file");

    let cfg = load_config_from(path.to_str().unwrap()).expect("load_config failed");
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.server.max_connections, 1000);
    assert_eq!(
        cfg.server.handshake_timeout(),
        std::time::Duration::from_millis(500)
    );
    assert_eq!(cfg.hub.mailbox_capacity, 16);
    assert_eq!(cfg.snapshot.backend, SnapshotBackend::Redis);
    assert_eq!(cfg.snapshot.redis_url, "redis://cache:6379/0");
    assert_eq!(cfg.snapshot.path, "snapshot_db");
    assert_eq!(cfg.snapshot.timeout(), std::time::Duration::from_millis(250));
}

#[test]
#[serial]
fn test_env_overrides_defaults() {
    temp_env::with_vars(
        [
            ("BOARDHUB_SERVER__PORT", Some("9100")),
            ("BOARDHUB_HUB__MAILBOX_CAPACITY", Some("8")),
            ("BOARDHUB_SNAPSHOT__BACKEND", Some("memory")),
            ("BOARDHUB_LOG__LEVEL", Some("debug")),
        ],
        || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.server.port, 9100);
            assert_eq!(cfg.hub.mailbox_capacity, 8);
            assert_eq!(cfg.snapshot.backend, SnapshotBackend::Memory);
            assert_eq!(cfg.log.level, "debug");
        },
    );
}

#[test]
#[serial]
fn test_unknown_backend_is_rejected() {
    temp_env::with_var("BOARDHUB_SNAPSHOT__BACKEND", Some("postgres"), || {
        assert!(load_config().is_err());
    });
}
