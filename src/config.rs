//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Monetary limits are written as strings in the file and parsed straight
//! into `Decimal`, so no value ever passes through a binary float.
//! The signing key is referenced by env-var name and resolved at startup.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub secrets: SecretsConfig,
    pub dashboard: DashboardConfig,
}

/// Everything the engine reads per cycle. The orchestrator clones this at
/// cycle start, so an update never changes a cycle mid-flight.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BotConfig {
    /// Our own address: claims for it, owns the allowance, receives the stake.
    pub account: String,
    /// Token the rewards are paid in.
    pub reward_token: String,
    /// Staking contract: allowance spender and stake target.
    pub staking_contract: String,
    /// Receipt token minted by the staking contract.
    pub staked_token: String,
    pub interval_hours: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_gas_multiplier", with = "rust_decimal::serde::str")]
    pub gas_limit_multiplier: Decimal,
    /// Below this, pending rewards are left to accrue and small claims are not restaked.
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub min_stake_amount: Option<Decimal>,
    /// Fee ceiling in the network's fee unit.
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub max_gas_price: Option<Decimal>,
    #[serde(default)]
    pub health_check_interval_mins: Option<u64>,
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SecretsConfig {
    pub signing_key_env: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

/// One year. Longer periods are treated as misconfiguration.
pub const MAX_INTERVAL_HOURS: u64 = 24 * 365;
pub const MAX_HEALTH_CHECK_MINS: u64 = 60 * 24 * 365;

fn default_gas_multiplier() -> Decimal {
    Decimal::new(12, 1)
}

fn default_true() -> bool {
    true
}

fn default_confirmation_timeout() -> u64 {
    300
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.bot.validate()?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

impl BotConfig {
    /// Reject values the scheduler and retry executor cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.interval_hours == 0 {
            bail!("interval_hours must be a positive integer");
        }
        if self.max_retries == 0 {
            bail!("max_retries must be a positive integer");
        }
        if self.retry_base_delay_ms == 0 {
            bail!("retry_base_delay_ms must be a positive integer");
        }
        if self.interval_hours > MAX_INTERVAL_HOURS {
            bail!("interval_hours must be at most {MAX_INTERVAL_HOURS}");
        }
        match self.health_check_interval_mins {
            Some(0) => bail!("health_check_interval_mins must be positive when set"),
            Some(m) if m > MAX_HEALTH_CHECK_MINS => {
                bail!("health_check_interval_mins must be at most {MAX_HEALTH_CHECK_MINS}")
            }
            _ => {}
        }
        if self.confirmation_timeout_secs == 0 {
            bail!("confirmation_timeout_secs must be positive");
        }
        if self.gas_limit_multiplier <= Decimal::ZERO {
            bail!("gas_limit_multiplier must be positive");
        }
        if matches!(self.min_stake_amount, Some(m) if m < Decimal::ZERO) {
            bail!("min_stake_amount cannot be negative");
        }
        if matches!(self.max_gas_price, Some(m) if m < Decimal::ZERO) {
            bail!("max_gas_price cannot be negative");
        }
        for (name, addr) in [
            ("account", &self.account),
            ("reward_token", &self.reward_token),
            ("staking_contract", &self.staking_contract),
            ("staked_token", &self.staked_token),
        ] {
            if addr.trim().is_empty() {
                bail!("{name} address must be set");
            }
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours.saturating_mul(3600))
    }

    pub fn health_check_interval(&self) -> Option<Duration> {
        self.health_check_interval_mins.map(|m| Duration::from_secs(m.saturating_mul(60)))
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    /// Apply a partial update. The result is validated before it replaces
    /// anything, so a bad update leaves the current config untouched.
    pub fn apply(&self, update: &ConfigUpdate) -> Result<BotConfig> {
        let mut next = self.clone();
        if let Some(v) = update.interval_hours {
            next.interval_hours = v;
        }
        if let Some(v) = update.max_retries {
            next.max_retries = v;
        }
        if let Some(v) = update.retry_base_delay_ms {
            next.retry_base_delay_ms = v;
        }
        if let Some(v) = update.gas_limit_multiplier {
            next.gas_limit_multiplier = v;
        }
        if let Some(v) = update.min_stake_amount {
            next.min_stake_amount = v;
        }
        if let Some(v) = update.max_gas_price {
            next.max_gas_price = v;
        }
        if let Some(v) = update.health_check_interval_mins {
            next.health_check_interval_mins = v;
        }
        if let Some(v) = update.metrics_enabled {
            next.metrics_enabled = v;
        }
        if let Some(v) = update.confirmation_timeout_secs {
            next.confirmation_timeout_secs = v;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Partial configuration change. `None` leaves a field alone; for the
/// optional limits, `Some(None)` clears the limit.
#[derive(Debug, Default, Clone)]
pub struct ConfigUpdate {
    pub interval_hours: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub gas_limit_multiplier: Option<Decimal>,
    pub min_stake_amount: Option<Option<Decimal>>,
    pub max_gas_price: Option<Option<Decimal>>,
    pub health_check_interval_mins: Option<Option<u64>>,
    pub metrics_enabled: Option<bool>,
    pub confirmation_timeout_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
