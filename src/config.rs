use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default)]
    pub use_json: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String,
    /// PostgreSQL connection URL for `db::Database::connect`
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub payment: PaymentConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "./logs".to_string()
}

fn default_log_file() -> String {
    "booking.log".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            acquire_timeout_secs: 5,
        }
    }
}

/// Payment gateway (VNPay-style) merchant settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PaymentConfig {
    pub tmn_code: String,
    pub hash_secret: String,
    pub pay_url: String,
    pub return_url: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_order_type")]
    pub order_type: String,
    /// Offset applied to `vnp_CreateDate` (the gateway expects GMT+7)
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

fn default_version() -> String {
    "2.1.0".to_string()
}

fn default_command() -> String {
    "pay".to_string()
}

fn default_currency() -> String {
    "VND".to_string()
}

fn default_order_type() -> String {
    "other".to_string()
}

fn default_utc_offset_hours() -> i32 {
    7
}

impl PaymentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tmn_code.trim().is_empty() {
            return Err(ConfigError::Invalid("payment.tmn_code is empty".into()));
        }
        if self.hash_secret.is_empty() {
            return Err(ConfigError::Invalid("payment.hash_secret is empty".into()));
        }
        if !(-12..=14).contains(&self.utc_offset_hours) {
            return Err(ConfigError::Invalid(format!(
                "payment.utc_offset_hours out of range: {}",
                self.utc_offset_hours
            )));
        }
        url::Url::parse(&self.pay_url)
            .map_err(|e| ConfigError::Invalid(format!("payment.pay_url: {}", e)))?;
        Ok(())
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load `config/{env}.yaml`
    pub fn load_env(env: &str) -> Result<Self, ConfigError> {
        Self::load(format!("config/{}.yaml", env))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.payment.validate()?;
        Ok(config)
    }
}
