//! Configuration resolution tests
//!
//! Tests that set `CODECITE_CONFIG` are marked #[serial] so they never race on the
//! process environment.

use codecite_common::config::{
    ConfigResolver, CodeciteConfig, EligibilityMode, CONFIG_ENV_VAR,
};
use codecite_common::Error;
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
#[serial]
fn test_cli_path_takes_priority_over_env() {
    let dir = TempDir::new().unwrap();
    let cli = write_config(&dir, "cli.toml", "[linking]\nreference_ceiling = 5\n");
    let from_env = write_config(&dir, "env.toml", "[linking]\nreference_ceiling = 9\n");
    env::set_var(CONFIG_ENV_VAR, &from_env);

    let (config, source) = ConfigResolver::new(Some(&cli)).resolve().unwrap();

    env::remove_var(CONFIG_ENV_VAR);
    assert_eq!(config.linking.reference_ceiling, Some(5));
    assert_eq!(source.as_deref(), Some(cli.as_path()));
}

#[test]
#[serial]
fn test_env_var_used_without_cli_path() {
    let dir = TempDir::new().unwrap();
    let from_env = write_config(
        &dir,
        "env.toml",
        r#"
        database_path = "/tmp/codecite-env.db"

        [export]
        eligibility = "all"
        "#,
    );
    env::set_var(CONFIG_ENV_VAR, &from_env);

    let (config, source) = ConfigResolver::new(None).resolve().unwrap();

    env::remove_var(CONFIG_ENV_VAR);
    assert_eq!(config.export.eligibility, EligibilityMode::All);
    assert_eq!(
        config.database_path(),
        std::path::PathBuf::from("/tmp/codecite-env.db")
    );
    assert_eq!(source, Some(from_env));
}

#[test]
#[serial]
fn test_explicit_missing_file_is_an_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.toml");

    let result = ConfigResolver::new(Some(&missing)).resolve();
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_malformed_file_is_an_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let dir = TempDir::new().unwrap();
    let bad = write_config(&dir, "bad.toml", "[providers\ncalls_per_window = ");

    let result = ConfigResolver::new(Some(&bad)).resolve();
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_full_config_round_trips_through_toml() {
    let mut config = CodeciteConfig::default();
    config.linking.reference_ceiling = Some(3);
    config.export.feature_groups = vec!["language-stats".to_string()];

    let text = toml::to_string(&config).unwrap();
    let parsed = CodeciteConfig::from_toml_str(&text).unwrap();
    assert_eq!(parsed, config);
}
