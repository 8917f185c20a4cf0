use config::{Config, File};
pub use config::ConfigError;
use serde::Deserialize;

use crate::grid::{GridError, GridResult, SymbolConfig};
use crate::notify::WebhookConfig;
use crate::treasury::TreasuryConfig;

/// Main configuration struct
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Exchange credentials and endpoint
    pub exchange: ExchangeConfig,
    /// Per-symbol grid policies
    pub symbols: Vec<SymbolConfig>,
    /// Treasury sizing and sweep policy
    pub treasury: TreasuryConfig,
    /// Polling cadences
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Webhook notification settings
    #[serde(default)]
    pub webhook: WebhookConfig,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize)]
pub struct ExchangeConfig {
    /// API key; normally supplied via GRIDBOT_EXCHANGE__API_KEY
    pub api_key: String,
    /// API secret; normally supplied via GRIDBOT_EXCHANGE__API_SECRET
    pub api_secret: String,
    /// Override the production endpoint (e.g. a testnet URL)
    #[serde(default)]
    pub base_url: Option<String>,
    /// Per-request HTTP timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct RunnerConfig {
    /// Seconds between grid engine cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Seconds between balance manager cycles
    #[serde(default = "default_balance_poll_interval")]
    pub balance_poll_interval_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            balance_poll_interval_secs: default_balance_poll_interval(),
        }
    }
}

fn default_poll_interval() -> u64 {
    1
}

fn default_balance_poll_interval() -> u64 {
    5
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load settings from a configuration file
    pub fn new(config_path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(config_path))
            // Environment variables override the file,
            // e.g. GRIDBOT_EXCHANGE__API_SECRET=...
            .add_source(config::Environment::with_prefix("GRIDBOT").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Validate the loaded settings
    pub fn validate(&self) -> GridResult<()> {
        if self.symbols.is_empty() {
            return Err(GridError::InvalidConfig(
                "at least one symbol must be configured".into(),
            ));
        }

        for symbol in &self.symbols {
            symbol.validate()?;
        }

        if self.treasury.deposit_hour_utc > 23 {
            return Err(GridError::InvalidConfig(
                "deposit_hour_utc must be 0..=23".into(),
            ));
        }

        if self.runner.poll_interval_secs == 0 || self.runner.balance_poll_interval_secs == 0 {
            return Err(GridError::InvalidConfig(
                "poll intervals must be at least 1 second".into(),
            ));
        }

        Ok(())
    }
}
