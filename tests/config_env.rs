use litreview::config::{AppConfig, ConfigError};
use serial_test::serial;
use std::path::PathBuf;

fn clear() {
    for k in ["JWT_SECRET", "LITREVIEW_BIND", "LITREVIEW_DATA_DIR", "DATABASE_URL", "FRONTEND_URL"] {
        std::env::remove_var(k);
    }
}

#[test]
#[serial]
fn reads_overrides_from_environment() {
    clear();
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    std::env::set_var("LITREVIEW_BIND", "127.0.0.1:9999");
    std::env::set_var("LITREVIEW_DATA_DIR", tmp.path());

    let cfg = AppConfig::from_env().unwrap();
    assert_eq!(cfg.bind, "127.0.0.1:9999");
    assert_eq!(cfg.snapshot_path(), tmp.path().join("state.json"));
    clear();
}

#[test]
#[serial]
fn refuses_to_start_without_secret() {
    clear();
    assert!(matches!(AppConfig::from_env(), Err(ConfigError::Missing("JWT_SECRET"))));
    std::env::set_var("JWT_SECRET", "too-short");
    assert!(matches!(AppConfig::from_env(), Err(ConfigError::WeakSecret)));
    std::env::set_var("JWT_SECRET", "x".repeat(32));
    assert_eq!(AppConfig::from_env().unwrap().data_dir, PathBuf::from("data"));
    clear();
}
