use std::{env, time::Duration};

use thiserror::Error;

use crate::producer::GenerationCounts;

/// Worker configuration, read once from the environment at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    db_dsn: String,
    db_max_connections: u32,
    db_acquire_timeout: Duration,
    batch_size: usize,
    bank_manager_count: usize,
    deposit_type_count: usize,
    product_count: usize,
    customer_count: usize,
    history_days: u32,
    txn_days_per_slice: u32,
    event_days_per_slice: u32,
    max_event_customers: usize,
    max_active_accounts: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// Load and validate the worker configuration from `DATAGEN_*`
    /// environment variables. Only the database DSN is required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_dsn = env_var("DATAGEN_DB_DSN")?;
        let db_max_connections = parse_u32("DATAGEN_DB_MAX_CONNECTIONS", 5)?;
        let db_acquire_timeout = parse_duration_ms("DATAGEN_DB_ACQUIRE_TIMEOUT_MS", 5_000)?;

        let batch_size = parse_usize("DATAGEN_BATCH_SIZE", 1_000)?;
        let bank_manager_count = parse_usize("DATAGEN_BANK_MANAGER_COUNT", 50)?;
        let deposit_type_count = parse_usize("DATAGEN_DEPOSIT_TYPE_COUNT", 10)?;
        let product_count = parse_usize("DATAGEN_PRODUCT_COUNT", 30)?;
        let customer_count = parse_usize("DATAGEN_CUSTOMER_COUNT", 1_000)?;

        let history_days = parse_u32("DATAGEN_HISTORY_DAYS", 365)?;
        let txn_days_per_slice = parse_u32("DATAGEN_TXN_DAYS_PER_SLICE", 15)?;
        let event_days_per_slice = parse_u32("DATAGEN_EVENT_DAYS_PER_SLICE", 30)?;
        let max_event_customers = parse_usize("DATAGEN_MAX_EVENT_CUSTOMERS", 500)?;
        let max_active_accounts = parse_usize("DATAGEN_MAX_ACTIVE_ACCOUNTS", 1_000)?;

        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                name: "DATAGEN_BATCH_SIZE",
                source: anyhow::anyhow!("batch size must be positive"),
            });
        }
        if txn_days_per_slice == 0 || event_days_per_slice == 0 {
            return Err(ConfigError::Invalid {
                name: "DATAGEN_TXN_DAYS_PER_SLICE",
                source: anyhow::anyhow!("slice sizes must be positive"),
            });
        }

        Ok(Self {
            db_dsn,
            db_max_connections,
            db_acquire_timeout,
            batch_size,
            bank_manager_count,
            deposit_type_count,
            product_count,
            customer_count,
            history_days,
            txn_days_per_slice,
            event_days_per_slice,
            max_event_customers,
            max_active_accounts,
        })
    }

    #[must_use]
    pub fn db_dsn(&self) -> &str {
        &self.db_dsn
    }

    #[must_use]
    pub fn db_max_connections(&self) -> u32 {
        self.db_max_connections
    }

    #[must_use]
    pub fn db_acquire_timeout(&self) -> Duration {
        self.db_acquire_timeout
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn history_days(&self) -> u32 {
        self.history_days
    }

    #[must_use]
    pub fn txn_days_per_slice(&self) -> u32 {
        self.txn_days_per_slice
    }

    #[must_use]
    pub fn event_days_per_slice(&self) -> u32 {
        self.event_days_per_slice
    }

    #[must_use]
    pub fn counts(&self) -> GenerationCounts {
        GenerationCounts {
            bank_managers: self.bank_manager_count,
            deposit_types: self.deposit_type_count,
            products: self.product_count,
            customers: self.customer_count,
            max_event_customers: self.max_event_customers,
            max_active_accounts: self.max_active_accounts,
        }
    }
}

#[cfg(test)]
impl Config {
    /// Small volumes for in-memory pipeline tests.
    pub(crate) fn test_default() -> Self {
        Self {
            db_dsn: "postgres://localhost/unused".to_string(),
            db_max_connections: 1,
            db_acquire_timeout: Duration::from_millis(1_000),
            batch_size: 16,
            bank_manager_count: 3,
            deposit_type_count: 5,
            product_count: 10,
            customer_count: 12,
            history_days: 45,
            txn_days_per_slice: 15,
            event_days_per_slice: 30,
            max_event_customers: 5,
            max_active_accounts: 20,
        }
    }
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
            name,
            source: anyhow::Error::new(e),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
            name,
            source: anyhow::Error::new(e),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::Invalid {
                name,
                source: anyhow::Error::new(e),
            }),
        Err(_) => Ok(Duration::from_millis(default_ms)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_only_dsn_is_set() {
        temp_env::with_vars(
            [("DATAGEN_DB_DSN", Some("postgres://localhost/datagen"))],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.batch_size(), 1_000);
                assert_eq!(config.history_days(), 365);
                assert_eq!(config.txn_days_per_slice(), 15);
                assert_eq!(config.counts().customers, 1_000);
            },
        );
    }

    #[test]
    fn missing_dsn_is_an_error() {
        temp_env::with_vars([("DATAGEN_DB_DSN", None::<&str>)], || {
            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::Missing("DATAGEN_DB_DSN")));
        });
    }

    #[test]
    fn invalid_number_is_reported_with_its_name() {
        temp_env::with_vars(
            [
                ("DATAGEN_DB_DSN", Some("postgres://localhost/datagen")),
                ("DATAGEN_BATCH_SIZE", Some("lots")),
            ],
            || {
                let err = Config::from_env().unwrap_err();
                assert!(err.to_string().contains("DATAGEN_BATCH_SIZE"));
            },
        );
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        temp_env::with_vars(
            [
                ("DATAGEN_DB_DSN", Some("postgres://localhost/datagen")),
                ("DATAGEN_BATCH_SIZE", Some("0")),
            ],
            || {
                assert!(Config::from_env().is_err());
            },
        );
    }

    #[test]
    fn overrides_take_effect() {
        temp_env::with_vars(
            [
                ("DATAGEN_DB_DSN", Some("postgres://localhost/datagen")),
                ("DATAGEN_CUSTOMER_COUNT", Some("25")),
                ("DATAGEN_TXN_DAYS_PER_SLICE", Some("7")),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.counts().customers, 25);
                assert_eq!(config.txn_days_per_slice(), 7);
            },
        );
    }
}
