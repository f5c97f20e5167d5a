use std::env;
use std::str::FromStr;
use std::time::Duration;

use log::warn;

use crate::data::hub::{DEFAULT_DELIVERY_TIMEOUT, DEFAULT_SHARD_COUNT};
use crate::data::store::{DEFAULT_COMPACTION_INTERVAL, DEFAULT_STORE_CAPACITY, DEFAULT_STORE_TTL};
use crate::errors::ConfigError;
use crate::provider::coindesk::DEFAULT_PRICE_API_BASE_URL;

// Server Configuration
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:3000";
pub const DEFAULT_API_BIND_ADDRESS: &str = "127.0.0.1:3001";
pub const STATS_INTERVAL_SECS: u64 = 60;

// Price Source Configuration
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    CoinDesk,
    Simulated,
}

impl FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coindesk" => Ok(SourceKind::CoinDesk),
            "simulated" => Ok(SourceKind::Simulated),
            other => Err(ConfigError::UnknownSource(other.to_string())),
        }
    }
}

pub struct Config {
    pub bind_address: String,
    pub api_bind_address: String,
    pub price_source: String,
    pub api_token: String,
    pub api_base_url: String,
    pub poll_interval: Duration,
    pub store_ttl: Duration,
    pub compaction_interval: Duration,
    pub store_capacity: usize,
    pub shard_count: usize,
    pub delivery_timeout: Duration,
    pub log_level: String,
    // Env values that failed to parse; reported once logging is up
    pub warnings: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let mut warnings = Vec::new();

        let poll_interval =
            Duration::from_millis(parse_var("POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS, &mut warnings));
        let store_ttl =
            Duration::from_secs(parse_var("STORE_TTL_SECS", DEFAULT_STORE_TTL.as_secs(), &mut warnings));
        let compaction_interval = Duration::from_secs(parse_var(
            "COMPACTION_INTERVAL_SECS",
            DEFAULT_COMPACTION_INTERVAL.as_secs(),
            &mut warnings,
        ));
        let store_capacity = parse_var("STORE_CAPACITY", DEFAULT_STORE_CAPACITY, &mut warnings);
        let shard_count = parse_var("SHARD_COUNT", DEFAULT_SHARD_COUNT, &mut warnings);
        let delivery_timeout = Duration::from_millis(parse_var(
            "DELIVERY_TIMEOUT_MS",
            DEFAULT_DELIVERY_TIMEOUT.as_millis() as u64,
            &mut warnings,
        ));

        Self {
            bind_address: env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string()),
            api_bind_address: env::var("API_BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_API_BIND_ADDRESS.to_string()),
            price_source: env::var("PRICE_SOURCE")
                .unwrap_or_else(|_| "coindesk".to_string()),
            api_token: env::var("PRICE_API_TOKEN").unwrap_or_default(),
            api_base_url: env::var("PRICE_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_PRICE_API_BASE_URL.to_string()),
            poll_interval,
            store_ttl,
            compaction_interval,
            store_capacity,
            shard_count,
            delivery_timeout,
            log_level: env::var("RUST_LOG")
                .unwrap_or_else(|_| "info".to_string()),
            warnings,
        }
    }

    pub fn source_kind(&self) -> Result<SourceKind, ConfigError> {
        self.price_source.parse()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_kind()? == SourceKind::CoinDesk && self.api_token.trim().is_empty() {
            return Err(ConfigError::MissingToken("PRICE_API_TOKEN"));
        }

        if self.poll_interval.is_zero() {
            return Err(ConfigError::Zero("POLL_INTERVAL_MS"));
        }
        if self.store_ttl.is_zero() {
            return Err(ConfigError::Zero("STORE_TTL_SECS"));
        }
        if self.compaction_interval.is_zero() {
            return Err(ConfigError::Zero("COMPACTION_INTERVAL_SECS"));
        }
        if self.store_capacity == 0 {
            return Err(ConfigError::Zero("STORE_CAPACITY"));
        }
        if self.shard_count == 0 {
            return Err(ConfigError::Zero("SHARD_COUNT"));
        }
        if self.delivery_timeout.is_zero() {
            return Err(ConfigError::Zero("DELIVERY_TIMEOUT_MS"));
        }

        Ok(())
    }

    pub fn log_config(&self) {
        println!("Server Configuration:");
        println!("  WebSocket Address: {}", self.bind_address);
        println!("  API Address: {}", self.api_bind_address);
        println!("  Price Source: {} ({})", self.price_source, self.api_base_url);
        println!("  Poll Interval: {:?}", self.poll_interval);
        println!("  Store TTL: {:?} (compaction every {:?})", self.store_ttl, self.compaction_interval);
        println!("  Shards: {}", self.shard_count);
        println!("  Log Level: {}", self.log_level);
        if !self.api_token.is_empty() {
            let prefix: String = self.api_token.chars().take(4).collect();
            println!("  API Token: {}***", prefix);
        }
        for warning in &self.warnings {
            warn!("{}", warning);
        }
    }
}

fn parse_var<T: FromStr>(key: &str, default: T, warnings: &mut Vec<String>) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warnings.push(format!("{} has invalid value '{}', using default", key, raw));
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            api_bind_address: DEFAULT_API_BIND_ADDRESS.to_string(),
            price_source: "coindesk".to_string(),
            api_token: "token-1234".to_string(),
            api_base_url: DEFAULT_PRICE_API_BASE_URL.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            store_ttl: DEFAULT_STORE_TTL,
            compaction_interval: DEFAULT_COMPACTION_INTERVAL,
            store_capacity: DEFAULT_STORE_CAPACITY,
            shard_count: DEFAULT_SHARD_COUNT,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            log_level: "info".to_string(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_config_from_env() {
        let config = Config::from_env();
        assert!(!config.bind_address.is_empty());
        assert!(!config.api_base_url.is_empty());
        assert!(config.shard_count > 0 || env::var("SHARD_COUNT").is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = base();
        assert!(config.validate().is_ok());

        config.api_token = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::MissingToken(_))));

        config.price_source = "simulated".to_string();
        assert!(config.validate().is_ok());

        config.shard_count = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Zero("SHARD_COUNT"))));
    }

    #[test]
    fn test_unknown_source_is_rejected() {
        let mut config = base();
        config.price_source = "bloomberg".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::UnknownSource(_))));
    }

    #[test]
    fn test_parse_var_falls_back_on_garbage() {
        let mut warnings = Vec::new();
        env::set_var("PRICE_STREAM_TEST_GARBAGE", "not-a-number");
        assert_eq!(parse_var("PRICE_STREAM_TEST_GARBAGE", 7u64, &mut warnings), 7);
        env::set_var("PRICE_STREAM_TEST_GARBAGE", " 42 ");
        assert_eq!(parse_var("PRICE_STREAM_TEST_GARBAGE", 7u64, &mut warnings), 42);
        env::remove_var("PRICE_STREAM_TEST_GARBAGE");

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("PRICE_STREAM_TEST_GARBAGE"));
    }

    #[test]
    fn test_invalid_env_values_are_kept_for_logging() {
        env::set_var("DELIVERY_TIMEOUT_MS", "soon");
        let config = Config::from_env();
        env::remove_var("DELIVERY_TIMEOUT_MS");

        assert_eq!(config.delivery_timeout, DEFAULT_DELIVERY_TIMEOUT);
        assert!(config
            .warnings
            .iter()
            .any(|w| w.contains("DELIVERY_TIMEOUT_MS") && w.contains("soon")));
    }
}
