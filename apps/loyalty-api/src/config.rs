//! Loyalty API configuration module.
//!
//! Configuration is loaded from `LOYALTY_*` environment variables with
//! fallback to defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use loyalty_core::DEFAULT_PAGE_SIZE;
use loyalty_db::DbConfig;

/// Loyalty API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Pool size
    pub db_max_connections: u32,

    /// JWT secret key for signing tokens
    pub jwt_secret: String,

    /// JWT access token lifetime in seconds
    pub jwt_access_lifetime_secs: i64,

    /// JWT refresh token lifetime in seconds
    pub jwt_refresh_lifetime_secs: i64,

    /// Orders per page in cashier history
    pub page_size: u32,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = ApiConfig {
            database_path: PathBuf::from(var("LOYALTY_DATABASE_PATH", "./loyalty.db")),

            db_max_connections: var("LOYALTY_DB_MAX_CONNECTIONS", "5")
                .parse()
                .map_err(|_| ConfigError::InvalidValue("LOYALTY_DB_MAX_CONNECTIONS".to_string()))?,

            // Must be set in production
            jwt_secret: var("LOYALTY_JWT_SECRET", "kasir-loyalty-dev-secret-change-in-production"),

            jwt_access_lifetime_secs: var("LOYALTY_JWT_ACCESS_LIFETIME_SECS", "3600") // 1 hour
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue("LOYALTY_JWT_ACCESS_LIFETIME_SECS".to_string())
                })?,

            jwt_refresh_lifetime_secs: var("LOYALTY_JWT_REFRESH_LIFETIME_SECS", "1209600") // 14 days
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue("LOYALTY_JWT_REFRESH_LIFETIME_SECS".to_string())
                })?,

            page_size: var("LOYALTY_PAGE_SIZE", &DEFAULT_PAGE_SIZE.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("LOYALTY_PAGE_SIZE".to_string()))?,
        };

        if config.jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("LOYALTY_JWT_SECRET".to_string()));
        }

        if config.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue("LOYALTY_DB_MAX_CONNECTIONS".to_string()));
        }

        if config.jwt_access_lifetime_secs <= 0 || config.jwt_refresh_lifetime_secs <= 0 {
            return Err(ConfigError::InvalidValue("LOYALTY_JWT_*_LIFETIME_SECS".to_string()));
        }

        if !(1..=100).contains(&config.page_size) {
            return Err(ConfigError::InvalidValue("LOYALTY_PAGE_SIZE".to_string()));
        }

        Ok(config)
    }

    /// Pool settings derived from this configuration.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database_path).max_connections(self.db_max_connections)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<ApiConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.database_path, PathBuf::from("./loyalty.db"));
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.jwt_access_lifetime_secs, 3600);
        assert_eq!(config.page_size, 10);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("LOYALTY_DATABASE_PATH", "/var/lib/kasir/loyalty.db"),
            ("LOYALTY_PAGE_SIZE", "25"),
            ("LOYALTY_JWT_SECRET", "s3cret"),
        ])
        .unwrap();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.db_config().max_connections, 5);
    }

    #[test]
    fn test_malformed_values() {
        assert!(matches!(
            load(&[("LOYALTY_PAGE_SIZE", "ten")]),
            Err(ConfigError::InvalidValue(key)) if key == "LOYALTY_PAGE_SIZE"
        ));
        assert!(load(&[("LOYALTY_PAGE_SIZE", "0")]).is_err());
        assert!(load(&[("LOYALTY_DB_MAX_CONNECTIONS", "0")]).is_err());
        assert!(matches!(
            load(&[("LOYALTY_JWT_SECRET", "  ")]),
            Err(ConfigError::MissingRequired(_))
        ));
    }
}
