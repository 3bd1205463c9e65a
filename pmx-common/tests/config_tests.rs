//! Config file resolution order
//!
//! Uses serial_test: these tests set and clear `PMX_CONFIG`.

use pmx_common::config::{load_toml_or_default, resolve_config_path, LoggingConfig, CONFIG_ENV_VAR};
use serde::Deserialize;
use serial_test::serial;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[derive(Debug, Default, Deserialize)]
struct AppConfig {
    #[serde(default)]
    logging: LoggingConfig,
}

#[test]
#[serial]
fn test_cli_argument_overrides_env() {
    std::env::set_var(CONFIG_ENV_VAR, "/from/env.toml");

    let path = resolve_config_path(Some(Path::new("/from/cli.toml")), "app.toml");
    std::env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(path, Some(PathBuf::from("/from/cli.toml")));
}

#[test]
#[serial]
fn test_env_used_without_cli_argument() {
    std::env::set_var(CONFIG_ENV_VAR, "/from/env.toml");

    let path = resolve_config_path(None, "app.toml");
    std::env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(path, Some(PathBuf::from("/from/env.toml")));
}

#[test]
#[serial]
fn test_blank_env_ignored() {
    std::env::set_var(CONFIG_ENV_VAR, "   ");

    let path = resolve_config_path(None, "pmx-test-does-not-exist.toml");
    std::env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(path, None);
}

#[test]
fn test_load_file_with_log_file() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("app.toml");
    fs::write(
        &config_path,
        "[logging]\nlevel = \"pmx_reconcile=trace\"\nfile = \"/var/log/pmx.log\"\n",
    )
    .unwrap();

    let config: AppConfig = load_toml_or_default(Some(&config_path)).unwrap();

    assert_eq!(config.logging.level, "pmx_reconcile=trace");
    assert_eq!(config.logging.file, Some(PathBuf::from("/var/log/pmx.log")));
}

#[test]
fn test_malformed_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("app.toml");
    fs::write(&config_path, "[logging\nlevel = 3").unwrap();

    let err = load_toml_or_default::<AppConfig>(Some(&config_path)).unwrap_err();

    assert!(matches!(err, pmx_common::Error::Config(_)));
    assert!(err.to_string().contains("app.toml"));
}

#[test]
fn test_no_path_gives_defaults() {
    let config: AppConfig = load_toml_or_default(None).unwrap();
    assert_eq!(config.logging, LoggingConfig::default());
}
