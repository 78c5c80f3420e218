use serde::Deserialize;

/// Process configuration, read from the environment per spec §6.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Postgres DSN for the account database.
    pub database_url: String,
    /// Address to bind the HTTP listener to, e.g. `"0.0.0.0:8081"`.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Shared secret used to verify inbound bearer tokens.
    pub jwt_secret: String,
    /// Max connections in the Postgres pool.
    #[serde(default = "default_pool_size")]
    pub database_max_connections: u32,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8081".to_string()
}

fn default_pool_size() -> u32 {
    10
}

impl Settings {
    /// Loads settings from `.env` (if present) and the process environment,
    /// with the prefix `ACCOUNT_SERVICE__` (double underscore as the nested
    /// separator, following the `config` crate's usual convention).
    pub fn load() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("ACCOUNT_SERVICE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
