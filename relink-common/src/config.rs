//! Configuration loading
//!
//! Bootstrap configuration only: database location, bind address, logging,
//! the optional entitlement connector and pairing limits. Resolution order:
//! 1. Command-line arguments (highest priority)
//! 2. Environment variables (`RELINK_DATABASE`, `RELINK_BIND`)
//! 3. TOML config file
//! 4. Compiled defaults (fallback)
//!
//! A missing config file is not an error; defaults are used. `Config::source`
//! records which file was read so the caller can report it once logging is
//! up.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding the database path
pub const ENV_DATABASE: &str = "RELINK_DATABASE";

/// Environment variable overriding the bind address
pub const ENV_BIND: &str = "RELINK_BIND";

/// Default HTTP bind address
pub const DEFAULT_BIND: &str = "127.0.0.1:5740";

/// Contents of the TOML bootstrap file
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// HTTP bind address (host:port)
    #[serde(default)]
    pub bind: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub entitlement: EntitlementConfig,

    #[serde(default)]
    pub pairing: PairingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Downstream entitlement (license) service
///
/// The connector is only built when `base_url` is present.
#[derive(Debug, Clone, Deserialize)]
pub struct EntitlementConfig {
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_entitlement_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for EntitlementConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: default_entitlement_timeout_ms(),
        }
    }
}

/// Manual pairing limits
#[derive(Debug, Clone, Deserialize)]
pub struct PairingConfig {
    /// Lifetime of an issued anti-replay nonce
    #[serde(default = "default_nonce_ttl_secs")]
    pub nonce_ttl_secs: i64,

    /// Half-width of the orphan matching window
    #[serde(default = "default_match_window_secs")]
    pub match_window_secs: i64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            nonce_ttl_secs: default_nonce_ttl_secs(),
            match_window_secs: default_match_window_secs(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_entitlement_timeout_ms() -> u64 {
    5000
}

fn default_nonce_ttl_secs() -> i64 {
    86_400
}

fn default_match_window_secs() -> i64 {
    60
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub bind: Option<String>,
}

/// Resolved application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub bind: String,
    pub logging: LoggingConfig,
    pub entitlement: EntitlementConfig,
    pub pairing: PairingConfig,

    /// Config file the values were read from; `None` when only built-in
    /// defaults apply
    pub source: Option<PathBuf>,
}

impl Config {
    /// Resolve configuration from CLI overrides, environment, TOML and defaults
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a config file exists but cannot be parsed,
    /// or if an explicitly requested config file is missing.
    pub fn load(overrides: ConfigOverrides) -> Result<Self> {
        let source = match &overrides.config_file {
            Some(path) if !path.exists() => {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            Some(path) => Some(path.clone()),
            None => locate_config_file(),
        };

        let toml_config = match &source {
            Some(path) => load_toml_file(path)?,
            None => TomlConfig::default(),
        };

        Ok(Self {
            source,
            ..Self::resolve(overrides, toml_config)
        })
    }

    /// Apply priority order over an already-parsed TOML config
    pub fn resolve(overrides: ConfigOverrides, toml_config: TomlConfig) -> Self {
        let database_path = overrides
            .database_path
            .or_else(|| std::env::var(ENV_DATABASE).ok().map(PathBuf::from))
            .or(toml_config.database_path)
            .unwrap_or_else(default_database_path);

        let bind = overrides
            .bind
            .or_else(|| std::env::var(ENV_BIND).ok())
            .or(toml_config.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());

        Config {
            database_path,
            bind,
            logging: toml_config.logging,
            entitlement: toml_config.entitlement,
            pairing: toml_config.pairing,
            source: None,
        }
    }
}

/// Parse a TOML bootstrap document
pub fn parse_toml(content: &str) -> Result<TomlConfig> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
}

fn load_toml_file(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    parse_toml(&content)
}

/// Find the config file for the platform, if one exists
fn locate_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("relink").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/relink/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("relink").join("relink.db"))
        .unwrap_or_else(|| PathBuf::from("./relink_data/relink.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_level() {
        assert_eq!(default_log_level(), "info");
    }

    #[test]
    fn test_default_pairing_limits() {
        let pairing = PairingConfig::default();
        assert_eq!(pairing.nonce_ttl_secs, 86_400);
        assert_eq!(pairing.match_window_secs, 60);
    }

    #[test]
    fn test_parse_full_document() {
        let config = parse_toml(
            r#"
            database_path = "/var/lib/relink/relink.db"
            bind = "0.0.0.0:8080"

            [logging]
            level = "debug"

            [entitlement]
            base_url = "http://licenses.internal"
            timeout_ms = 2500

            [pairing]
            match_window_secs = 90
            "#,
        )
        .unwrap();

        assert_eq!(
            config.database_path,
            Some(PathBuf::from("/var/lib/relink/relink.db"))
        );
        assert_eq!(config.bind.as_deref(), Some("0.0.0.0:8080"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.entitlement.base_url.as_deref(),
            Some("http://licenses.internal")
        );
        assert_eq!(config.entitlement.timeout_ms, 2500);
        assert_eq!(config.pairing.match_window_secs, 90);
        assert_eq!(config.pairing.nonce_ttl_secs, 86_400);
    }

    #[test]
    fn test_parse_invalid_document() {
        let result = parse_toml("bind = [");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
