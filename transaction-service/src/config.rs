use std::time::Duration;

use serde::Deserialize;

/// Process configuration, read from the environment per spec §6.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Postgres DSN for the transaction database.
    pub database_url: String,
    /// Address to bind the HTTP listener to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Shared secret used to verify inbound bearer tokens.
    pub jwt_secret: String,
    /// Max connections in the Postgres pool.
    #[serde(default = "default_pool_size")]
    pub database_max_connections: u32,
    /// Base URL of the Account Service, e.g. `"http://account-service:8081"`.
    pub account_service_base_url: String,
    /// Pre-minted `INTERNAL_SERVICE` bearer token this process presents to
    /// the Account Service on every call the [`crate::client::ResilientAccountClient`]
    /// makes (spec §4.4: `INTERNAL_SERVICE` is a privileged role that
    /// bypasses owner checks).
    pub account_service_token: String,
    /// Redis connection string backing the Read-Side Cache.
    pub cache_url: String,
    /// Path to the JSON file describing per-account-type transaction limit
    /// profiles (spec §3's `TransactionLimit profile`).
    pub limit_profile_path: String,
    #[serde(flatten)]
    pub resilience: ResilienceSettings,
}

/// Tunables for the Resilient Account Client (spec §4.3), all overridable
/// via environment but defaulting to the values spec.md gives.
#[derive(Debug, Clone, Deserialize)]
pub struct ResilienceSettings {
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_retry_base_backoff_secs")]
    pub retry_base_backoff_secs: u64,
    #[serde(default = "default_circuit_window_size")]
    pub circuit_window_size: usize,
    #[serde(default = "default_circuit_min_calls")]
    pub circuit_minimum_calls: usize,
    #[serde(default = "default_circuit_failure_rate_threshold")]
    pub circuit_failure_rate_threshold: f64,
    #[serde(default = "default_circuit_open_duration_secs")]
    pub circuit_open_duration_secs: u64,
    #[serde(default = "default_circuit_half_open_probes")]
    pub circuit_half_open_probes: usize,
}

impl ResilienceSettings {
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    #[must_use]
    pub fn retry_base_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_base_backoff_secs)
    }

    #[must_use]
    pub fn circuit_open_duration(&self) -> Duration {
        Duration::from_secs(self.circuit_open_duration_secs)
    }
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout_secs(),
            max_retry_attempts: default_max_retry_attempts(),
            retry_base_backoff_secs: default_retry_base_backoff_secs(),
            circuit_window_size: default_circuit_window_size(),
            circuit_minimum_calls: default_circuit_min_calls(),
            circuit_failure_rate_threshold: default_circuit_failure_rate_threshold(),
            circuit_open_duration_secs: default_circuit_open_duration_secs(),
            circuit_half_open_probes: default_circuit_half_open_probes(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8082".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_call_timeout_secs() -> u64 {
    8
}

fn default_max_retry_attempts() -> u32 {
    5
}

fn default_retry_base_backoff_secs() -> u64 {
    2
}

fn default_circuit_window_size() -> usize {
    15
}

fn default_circuit_min_calls() -> usize {
    8
}

fn default_circuit_failure_rate_threshold() -> f64 {
    0.6
}

fn default_circuit_open_duration_secs() -> u64 {
    45
}

fn default_circuit_half_open_probes() -> usize {
    3
}

impl Settings {
    /// Loads settings from `.env` (if present) and the process environment,
    /// prefixed `TRANSACTION_SERVICE__`.
    pub fn load() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("TRANSACTION_SERVICE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
