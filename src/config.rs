//! Configuration management for trustmint

use crate::crypto::address_from_hex;
use crate::error::{LedgerError, Result};
use crate::identity::BatchPolicy;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
}

#[derive(Debug, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_batch_policy")]
    pub batch_policy: BatchPolicy,
}

#[derive(Debug, Deserialize)]
pub struct TokenConfig {
    #[serde(default = "default_supply_ops_while_paused")]
    pub supply_ops_while_paused: bool,
}

#[derive(Debug, Deserialize)]
pub struct PlatformConfig {
    /// Hex address receiving order fees; the demo generates one when unset
    #[serde(default)]
    pub fee_sink: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            batch_policy: default_batch_policy(),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        TokenConfig {
            supply_ops_while_paused: default_supply_ops_while_paused(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig { fee_sink: None }
    }
}

fn default_batch_policy() -> BatchPolicy {
    BatchPolicy::BestEffort
}

fn default_supply_ops_while_paused() -> bool {
    true
}

pub fn load_config() -> Result<Config> {
    load_config_from(Path::new("config.toml"))
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    let config_str = fs::read_to_string(path).unwrap_or_default();
    let config: Config = if config_str.is_empty() {
        // Sane defaults when the config file is absent
        Config {
            registry: RegistryConfig::default(),
            token: TokenConfig::default(),
            platform: PlatformConfig::default(),
        }
    } else {
        toml::from_str(&config_str)
            .map_err(|e| LedgerError::ConfigError(format!("Invalid config file: {}", e)))?
    };

    // Validate critical values
    if let Some(ref fee_sink) = config.platform.fee_sink {
        address_from_hex(fee_sink).map_err(|e| {
            LedgerError::ConfigError(format!("platform.fee_sink is not a valid address: {}", e))
        })?;
    }

    Ok(config)
}
