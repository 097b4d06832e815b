//! Configuration management for Shelfkeeper

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Format name understood by the data manager factory
    pub format: String,
    pub data_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub backup_enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoansConfig {
    pub default_loan_days: i64,
    /// Upper bound for a checkout period and for the due date after extensions
    pub max_loan_days: i64,
    /// Days added by an extension when the request names none
    pub extension_days: i64,
    pub max_loans_per_user: u32,
    pub fine_per_day: f64,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub loans: LoansConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default").required(false))
            // Layer on the environment-specific file
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add environment variables (SHELFKEEPER_STORAGE__FORMAT=csv)
            .add_source(
                Environment::with_prefix("SHELFKEEPER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            // Override data directory from DATA_DIR env var if present
            .set_override_option("storage.data_dir", env::var("DATA_DIR").ok())?
            .build()?;

        config.try_deserialize()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
            data_dir: PathBuf::from("data"),
            backup_dir: PathBuf::from("backups"),
            backup_enabled: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for LoansConfig {
    fn default() -> Self {
        Self {
            default_loan_days: 14,
            max_loan_days: 365,
            extension_days: 7,
            max_loans_per_user: 3,
            fine_per_day: 0.5,
        }
    }
}
