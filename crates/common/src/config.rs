//! Client configuration: defaults, environment variables and TOML files.
//!
//! Environment variables read by [`ClientConfig::from_env`]:
//! - `CTRACK_CONTRACT_ADDRESS`: contract address, 40 hex chars (optional)
//! - `CTRACK_SUCCESS_CLEAR_MS`: success status lifetime (default: 2000)
//! - `CTRACK_ERROR_CLEAR_MS`: error status lifetime (default: 3000)
//! - `CTRACK_ALERT_AFTER_SECS`: age after which unverified assets alert (default: 259200)
//! - `CTRACK_ID_PREFIX`: prefix of generated asset identifiers (default: "asset")

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::Address;

pub const DEFAULT_SUCCESS_CLEAR_MS: u64 = 2000;
pub const DEFAULT_ERROR_CLEAR_MS: u64 = 3000;
pub const DEFAULT_ALERT_AFTER_SECS: u64 = 72 * 3600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{name} invalid: '{value}'")]
    InvalidVar { name: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Contract address (hex). When absent the ledger's own address is used.
    pub contract_address: Option<String>,
    /// How long a success status stays visible.
    pub success_clear_ms: u64,
    /// How long an error status stays visible.
    pub error_clear_ms: u64,
    /// Unverified assets older than this are classified as alerts.
    pub alert_after_secs: u64,
    /// Prefix of generated asset identifiers.
    pub id_prefix: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            contract_address: None,
            success_clear_ms: DEFAULT_SUCCESS_CLEAR_MS,
            error_clear_ms: DEFAULT_ERROR_CLEAR_MS,
            alert_after_secs: DEFAULT_ALERT_AFTER_SECS,
            id_prefix: "asset".to_string(),
        }
    }
}

impl ClientConfig {
    /// Builds a config from `CTRACK_*` variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let contract_address = std::env::var("CTRACK_CONTRACT_ADDRESS").ok();
        let success_clear_ms = env_u64("CTRACK_SUCCESS_CLEAR_MS", defaults.success_clear_ms)?;
        let error_clear_ms = env_u64("CTRACK_ERROR_CLEAR_MS", defaults.error_clear_ms)?;
        let alert_after_secs = env_u64("CTRACK_ALERT_AFTER_SECS", defaults.alert_after_secs)?;
        let id_prefix = std::env::var("CTRACK_ID_PREFIX").unwrap_or(defaults.id_prefix);

        let cfg = Self {
            contract_address,
            success_clear_ms,
            error_clear_ms,
            alert_after_secs,
            id_prefix,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Loads a TOML file. Missing keys take their defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path.as_ref())?;
        let cfg: ClientConfig = toml::from_str(&s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(addr) = &self.contract_address {
            addr.parse::<Address>().map_err(ConfigError::Invalid)?;
        }
        if self.success_clear_ms == 0 || self.error_clear_ms == 0 {
            return Err(ConfigError::Invalid(
                "status clear delays must be greater than zero".to_string(),
            ));
        }
        if self.id_prefix.is_empty() {
            return Err(ConfigError::Invalid("id_prefix must not be empty".to_string()));
        }
        Ok(())
    }

    /// Parsed contract address, if configured.
    pub fn contract(&self) -> Result<Option<Address>, ConfigError> {
        self.contract_address
            .as_deref()
            .map(|s| s.parse::<Address>().map_err(ConfigError::Invalid))
            .transpose()
    }

    pub fn success_clear(&self) -> Duration {
        Duration::from_millis(self.success_clear_ms)
    }

    pub fn error_clear(&self) -> Duration {
        Duration::from_millis(self.error_clear_ms)
    }
}

fn env_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) => val
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidVar { name, value: val }),
        Err(_) => Ok(default),
    }
}
