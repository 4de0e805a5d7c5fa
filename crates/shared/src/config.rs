//! Application configuration management.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// JWT configuration.
    pub jwt: JwtSettings,
    /// Fiscal closure settings.
    #[serde(default)]
    pub closure: ClosureSettingsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// JWT configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Secret key for signing tokens.
    pub secret: String,
    /// Access token expiration in seconds.
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry_secs: u64,
    /// Expected `iss` claim.
    #[serde(default = "default_issuer")]
    pub issuer: String,
}

fn default_issuer() -> String {
    "closure".to_string()
}

fn default_access_token_expiry() -> u64 {
    900 // 15 minutes
}

/// Fiscal closure settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ClosureSettingsConfig {
    /// Functional (reporting) currency of the ledger.
    #[serde(default = "default_functional_currency")]
    pub functional_currency: String,
    /// Corporate income tax rate applied to taxable profit.
    #[serde(default = "default_profit_tax_rate")]
    pub profit_tax_rate: Decimal,
    /// Overrides of the default closing accounts, keyed by purpose
    /// (e.g. `fx_gain = "7651"`).
    #[serde(default)]
    pub accounts: HashMap<String, String>,
}

impl Default for ClosureSettingsConfig {
    fn default() -> Self {
        Self {
            functional_currency: default_functional_currency(),
            profit_tax_rate: default_profit_tax_rate(),
            accounts: HashMap::new(),
        }
    }
}

fn default_functional_currency() -> String {
    "RON".to_string()
}

fn default_profit_tax_rate() -> Decimal {
    Decimal::new(16, 2)
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("CLOSURE").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_load_from_environment() {
        temp_env::with_vars(
            [
                ("CLOSURE__SERVER__PORT", Some("9090")),
                ("CLOSURE__DATABASE__URL", Some("postgres://localhost/closure")),
                ("CLOSURE__JWT__SECRET", Some("secret")),
                ("RUN_MODE", Some("test-without-files")),
            ],
            || {
                let config = AppConfig::load().unwrap();
                assert_eq!(config.server.port, 9090);
                assert_eq!(config.server.host, "0.0.0.0");
                assert_eq!(config.database.url, "postgres://localhost/closure");
                assert_eq!(config.database.max_connections, 10);
                assert_eq!(config.jwt.access_token_expiry_secs, 900);
                assert_eq!(config.jwt.issuer, "closure");
                assert_eq!(config.closure.functional_currency, "RON");
                assert_eq!(config.closure.profit_tax_rate, dec!(0.16));
            },
        );
    }

    #[test]
    fn test_missing_database_url_fails() {
        temp_env::with_vars(
            [
                ("CLOSURE__DATABASE__URL", None::<&str>),
                ("CLOSURE__JWT__SECRET", Some("secret")),
                ("RUN_MODE", Some("test-without-files")),
            ],
            || {
                assert!(AppConfig::load().is_err());
            },
        );
    }

    #[test]
    fn test_closure_defaults() {
        let settings = ClosureSettingsConfig::default();
        assert_eq!(settings.profit_tax_rate, dec!(0.16));
        assert!(settings.accounts.is_empty());
    }
}
