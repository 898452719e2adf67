//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`; the `IS_PAPER` env var can
//! override the configured trade mode.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use secrecy::Secret;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::broker::ApiCredentials;
use crate::engine::RetryPolicy;
use crate::store::DEFAULT_STATE_FILE;
use crate::types::{InvestmentPlan, OrderAmount, RecurrenceInterval, TradeMode};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub plan: PlanConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub agent: AgentConfig,
}

/// The recurring purchase: symbol, size (exactly one of `notional` dollars
/// or `quantity` shares), interval, and paper/live mode.
#[derive(Debug, Deserialize, Clone)]
pub struct PlanConfig {
    pub symbol: String,
    #[serde(default)]
    pub notional: Option<Decimal>,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    pub interval: RecurrenceInterval,
    #[serde(default = "default_mode")]
    pub mode: TradeMode,
}

impl PlanConfig {
    /// Build the validated, immutable plan the engine runs on.
    /// `is_paper_override` is the raw `IS_PAPER` env value, if set.
    pub fn build(&self, is_paper_override: Option<&str>) -> Result<InvestmentPlan> {
        let amount = match (self.notional, self.quantity) {
            (Some(n), None) => OrderAmount::Notional(n),
            (None, Some(q)) => OrderAmount::Quantity(q),
            (Some(_), Some(_)) => {
                anyhow::bail!("Plan must set either notional or quantity, not both")
            }
            (None, None) => anyhow::bail!("Plan must set notional or quantity"),
        };
        let mode = TradeMode::resolve(self.mode, is_paper_override);
        InvestmentPlan::new(self.symbol.clone(), amount, self.interval, mode)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrokerConfig {
    /// Env var names holding the API credentials, not the credentials
    /// themselves.
    pub api_key_env: String,
    pub api_secret_env: String,
    pub request_timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            api_key_env: "API_KEY".to_string(),
            api_secret_env: "API_SECRET".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl BrokerConfig {
    /// Resolve the credential env vars.
    pub fn credentials(&self) -> Result<ApiCredentials> {
        let key_id = std::env::var(&self.api_key_env)
            .with_context(|| format!("Environment variable not set: {}", self.api_key_env))?;
        let secret_key = std::env::var(&self.api_secret_env)
            .with_context(|| format!("Environment variable not set: {}", self.api_secret_env))?;
        Ok(ApiCredentials {
            key_id,
            secret_key: Secret::new(secret_key),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub state_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: DEFAULT_STATE_FILE.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// How often the run loop wakes to check whether an order is due.
    /// Safe at any cadence; the scheduler and store enforce at-most-once.
    pub tick_interval_secs: u64,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }
}

fn default_mode() -> TradeMode {
    TradeMode::Paper
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = r#"
        [plan]
        symbol = "VOO"
        notional = 100.0
        interval = "1 day"
        mode = "paper"

        [agent]
        name = "DRIP-001"
        tick_interval_secs = 300
    "#;

    #[test]
    fn test_parse_sample_config() {
        let cfg: AppConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.plan.symbol, "VOO");
        assert_eq!(cfg.plan.notional, Some(dec!(100)));
        assert_eq!(cfg.plan.interval, RecurrenceInterval::Daily);
        assert_eq!(cfg.agent.tick_interval_secs, 300);
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let cfg: AppConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.broker.api_key_env, "API_KEY");
        assert_eq!(cfg.broker.api_secret_env, "API_SECRET");
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.storage.state_file, DEFAULT_STATE_FILE);
    }

    #[test]
    fn test_build_plan_notional() {
        let cfg: AppConfig = toml::from_str(SAMPLE).unwrap();
        let plan = cfg.plan.build(None).unwrap();
        assert_eq!(plan.symbol, "VOO");
        assert_eq!(plan.amount, OrderAmount::Notional(dec!(100)));
        assert_eq!(plan.mode, TradeMode::Paper);
    }

    #[test]
    fn test_build_plan_mode_override() {
        let cfg: AppConfig = toml::from_str(SAMPLE).unwrap();
        let plan = cfg.plan.build(Some("false")).unwrap();
        assert_eq!(plan.mode, TradeMode::Live);
    }

    #[test]
    fn test_build_plan_rejects_ambiguous_amount() {
        let mut cfg: AppConfig = toml::from_str(SAMPLE).unwrap();
        cfg.plan.quantity = Some(dec!(1));
        assert!(cfg.plan.build(None).is_err());

        cfg.plan.notional = None;
        cfg.plan.quantity = None;
        assert!(cfg.plan.build(None).is_err());
    }

    #[test]
    fn test_retry_policy_floor() {
        let retry = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        // Zero attempts would mean never submitting; clamp to one.
        assert_eq!(retry.policy().max_attempts, 1);
    }

    #[test]
    fn test_quantity_plan_config() {
        let toml_str = r#"
            [plan]
            symbol = "voo"
            quantity = 0.5
            interval = "weekly"

            [agent]
            name = "DRIP-002"
            tick_interval_secs = 3600
        "#;
        let cfg: AppConfig = toml::from_str(toml_str).unwrap();
        let plan = cfg.plan.build(None).unwrap();
        assert_eq!(plan.amount, OrderAmount::Quantity(dec!(0.5)));
        assert_eq!(plan.interval, RecurrenceInterval::Weekly);
        assert_eq!(plan.mode, TradeMode::Paper); // default
        assert_eq!(plan.symbol, "VOO");
    }
}
