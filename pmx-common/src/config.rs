//! Configuration file resolution and loading
//!
//! Config file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config directory (`<config_dir>/pmx/<file_name>`)
//! 4. None: compiled defaults are used
//!
//! A missing or absent config file is never fatal; the caller gets defaults
//! and a warning is logged.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PMX_CONFIG";

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error, or `target=level` list)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolve which config file to read.
///
/// Returns `None` when no candidate exists; an explicitly requested file
/// (CLI or environment) is returned even if it does not exist so the loader
/// can report it.
pub fn resolve_config_path(cli_arg: Option<&Path>, file_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config directory
    let user_config = dirs::config_dir().map(|d| d.join("pmx").join(file_name))?;
    if user_config.exists() {
        Some(user_config)
    } else {
        None
    }
}

/// Parse a TOML config document
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> Result<T> {
    Ok(toml::from_str(content)?)
}

/// Load a TOML config file.
///
/// - `None` path → defaults
/// - Missing file → warning + defaults
/// - Unreadable or malformed file → error (a config the user wrote must not be
///   silently ignored)
pub fn load_toml_or_default<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        info!("No config file found, using built-in defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(
            "Config file {} does not exist, using built-in defaults",
            path.display()
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = parse_toml(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize)]
    struct Sample {
        #[serde(default)]
        logging: LoggingConfig,
    }

    #[test]
    fn test_logging_defaults() {
        let sample: Sample = parse_toml("").unwrap();
        assert_eq!(sample.logging.level, "info");
        assert!(sample.logging.file.is_none());
    }

    #[test]
    fn test_logging_section_parsed() {
        let sample: Sample = parse_toml(
            r#"
            [logging]
            level = "debug"
            file = "/tmp/pmx.log"
            "#,
        )
        .unwrap();
        assert_eq!(sample.logging.level, "debug");
        assert_eq!(sample.logging.file, Some(PathBuf::from("/tmp/pmx.log")));
    }

    #[test]
    fn test_cli_argument_wins() {
        let path = resolve_config_path(Some(Path::new("/tmp/explicit.toml")), "reconcile.toml");
        assert_eq!(path, Some(PathBuf::from("/tmp/explicit.toml")));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let sample: Sample =
            load_toml_or_default(Some(Path::new("/nonexistent/pmx/config.toml"))).unwrap();
        assert_eq!(sample.logging, LoggingConfig::default());
    }
}
