//! Configuration resolution priority tests
//!
//! Tests that touch RELINK_* environment variables are marked #[serial]
//! so they never run concurrently.

use relink_common::config::{
    default_database_path, parse_toml, Config, ConfigOverrides, TomlConfig, DEFAULT_BIND,
    ENV_BIND, ENV_DATABASE,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;

fn clear_env() {
    env::remove_var(ENV_DATABASE);
    env::remove_var(ENV_BIND);
}

#[test]
#[serial]
fn test_defaults_when_nothing_configured() {
    clear_env();

    let config = Config::resolve(ConfigOverrides::default(), TomlConfig::default());
    assert_eq!(config.source, None);

    assert_eq!(config.database_path, default_database_path());
    assert_eq!(config.bind, DEFAULT_BIND);
    assert_eq!(config.logging.level, "info");
    assert!(config.entitlement.base_url.is_none());
}

#[test]
#[serial]
fn test_toml_beats_defaults() {
    clear_env();

    let toml = parse_toml(
        r#"
        database_path = "/srv/relink.db"
        bind = "0.0.0.0:9000"
        "#,
    )
    .unwrap();
    let config = Config::resolve(ConfigOverrides::default(), toml);

    assert_eq!(config.database_path, PathBuf::from("/srv/relink.db"));
    assert_eq!(config.bind, "0.0.0.0:9000");
}

#[test]
#[serial]
fn test_env_beats_toml() {
    clear_env();
    env::set_var(ENV_DATABASE, "/env/relink.db");
    env::set_var(ENV_BIND, "127.0.0.1:7000");

    let toml = parse_toml(
        r#"
        database_path = "/srv/relink.db"
        bind = "0.0.0.0:9000"
        "#,
    )
    .unwrap();
    let config = Config::resolve(ConfigOverrides::default(), toml);

    assert_eq!(config.database_path, PathBuf::from("/env/relink.db"));
    assert_eq!(config.bind, "127.0.0.1:7000");

    clear_env();
}

#[test]
#[serial]
fn test_cli_beats_env() {
    clear_env();
    env::set_var(ENV_DATABASE, "/env/relink.db");

    let overrides = ConfigOverrides {
        config_file: None,
        database_path: Some(PathBuf::from("/cli/relink.db")),
        bind: Some("127.0.0.1:6000".to_string()),
    };
    let config = Config::resolve(overrides, TomlConfig::default());

    assert_eq!(config.database_path, PathBuf::from("/cli/relink.db"));
    assert_eq!(config.bind, "127.0.0.1:6000");

    clear_env();
}

#[test]
#[serial]
fn test_explicit_missing_config_file_is_error() {
    clear_env();

    let overrides = ConfigOverrides {
        config_file: Some(PathBuf::from("/nonexistent/relink/config.toml")),
        ..Default::default()
    };

    assert!(Config::load(overrides).is_err());
}

#[test]
#[serial]
fn test_explicit_config_file_loaded() {
    clear_env();

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
        database_path = "/from/file.db"

        [entitlement]
        base_url = "http://licenses.local"
        "#,
    )
    .unwrap();

    let config = Config::load(ConfigOverrides {
        config_file: Some(path.clone()),
        ..Default::default()
    })
    .unwrap();

    assert_eq!(config.source, Some(path));
    assert_eq!(config.database_path, PathBuf::from("/from/file.db"));
    assert_eq!(
        config.entitlement.base_url.as_deref(),
        Some("http://licenses.local")
    );
}
