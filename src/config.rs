use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_BATCH_SIZE: u32 = 100;
pub const MAX_BATCH_SIZE: u32 = 1_000;
pub const DEFAULT_CYCLE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_PAYMENT_API_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub expiry: ExpiryConfig,
    pub payment_instructions: PaymentInstructionsConfig,
}

/// Settings for the expiry reconciliation worker
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ExpiryConfig {
    pub poll_interval_ms: u64,
    pub batch_size: u32,
    pub cycle_timeout_ms: u64,
    /// Entries transitioned in parallel within one cycle (1 = sequential)
    pub max_concurrency: usize,
    pub free_payment_instruction_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PaymentInstructionsConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            batch_size: DEFAULT_BATCH_SIZE,
            cycle_timeout_ms: DEFAULT_CYCLE_TIMEOUT_MS,
            max_concurrency: 1,
            free_payment_instruction_id: None,
        }
    }
}

impl Default for PaymentInstructionsConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            request_timeout_ms: DEFAULT_PAYMENT_API_TIMEOUT_MS,
        }
    }
}

impl ExpiryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_millis(self.cycle_timeout_ms)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let batch_size: u32 = parse_or(&non_empty, "EXPIRY_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        if batch_size == 0 {
            return Err(ConfigError::Message(
                "EXPIRY_BATCH_SIZE must be at least 1".to_string(),
            ));
        }

        let poll_interval_ms: u64 =
            parse_or(&non_empty, "EXPIRY_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?;
        if poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "EXPIRY_POLL_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }

        let expiry = ExpiryConfig {
            poll_interval_ms,
            batch_size: batch_size.min(MAX_BATCH_SIZE),
            cycle_timeout_ms: parse_or(&non_empty, "EXPIRY_CYCLE_TIMEOUT_MS", DEFAULT_CYCLE_TIMEOUT_MS)?,
            max_concurrency: parse_or(&non_empty, "EXPIRY_MAX_CONCURRENCY", 1usize)?.max(1),
            free_payment_instruction_id: non_empty("FREE_PAYMENT_INSTRUCTION_ID"),
        };

        let payment_instructions = PaymentInstructionsConfig {
            api_url: non_empty("PAYMENT_INSTRUCTIONS_API_URL"),
            api_key: non_empty("PAYMENT_INSTRUCTIONS_API_KEY"),
            request_timeout_ms: parse_or(
                &non_empty,
                "PAYMENT_INSTRUCTIONS_TIMEOUT_MS",
                DEFAULT_PAYMENT_API_TIMEOUT_MS,
            )?,
        };

        Ok(Self {
            database_url: non_empty("DATABASE_URL")
                .unwrap_or_else(|| "postgresql://localhost/feeds".to_string()),
            bind_address: non_empty("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            expiry,
            payment_instructions,
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::Message(format!("{} has invalid value {:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}
