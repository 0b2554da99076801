//! Process configuration, read once at startup from `STOCKLINE_*` environment variables.

use std::time::Duration;

use thiserror::Error;

use crate::placement::RetryConfig;

pub const ENV_PREFIX: &str = "STOCKLINE_";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has invalid value '{value}': {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("{key} must not be empty")]
    Empty { key: String },
}

/// Postgres connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Upper bound on waiting for a variant row lock inside a placement.
    pub lock_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    /// `None` selects the in-memory store.
    pub database: Option<DatabaseConfig>,
    /// Accepted API versions, oldest first.
    pub accepted_versions: Vec<String>,
    pub order_deadline: Duration,
    pub retry: RetryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database: None,
            accepted_versions: vec!["v1".to_string()],
            order_deadline: Duration::from_millis(5000),
            retry: RetryConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Keys are passed with the `STOCKLINE_` prefix.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let defaults = Self::default();

        let database = match env.get("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: env.parse("DB_MAX_CONNECTIONS")?.unwrap_or(10),
                acquire_timeout: env.millis("DB_ACQUIRE_TIMEOUT_MS")?.unwrap_or(Duration::from_secs(5)),
                lock_timeout: env.millis("DB_LOCK_TIMEOUT_MS")?.unwrap_or(Duration::from_secs(2)),
            }),
            None => None,
        };

        let accepted_versions = match env.get("ACCEPTED_VERSIONS") {
            Some(raw) => {
                let versions: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .collect();
                if versions.is_empty() {
                    return Err(ConfigError::Empty {
                        key: env.key("ACCEPTED_VERSIONS"),
                    });
                }
                versions
            }
            None => defaults.accepted_versions,
        };

        let retry = RetryConfig {
            max_attempts: env.parse("RETRY_MAX_ATTEMPTS")?.unwrap_or(defaults.retry.max_attempts),
            base_delay: env.millis("RETRY_BASE_DELAY_MS")?.unwrap_or(defaults.retry.base_delay),
            ..defaults.retry
        };
        if retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: env.key("RETRY_MAX_ATTEMPTS"),
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }

        Ok(Self {
            port: env.parse("PORT")?.unwrap_or(defaults.port),
            database,
            accepted_versions,
            order_deadline: env.millis("ORDER_DEADLINE_MS")?.unwrap_or(defaults.order_deadline),
            retry,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn key(&self, name: &str) -> String {
        format!("{ENV_PREFIX}{name}")
    }

    /// Unset and blank are the same thing.
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(&self.key(name))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, name: &str) -> Result<Option<T>, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(name)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| ConfigError::Invalid {
                    key: self.key(name),
                    value: raw.clone(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn millis(&self, name: &str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(name)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_select_in_memory_store_on_8080() {
        let config = load(&[]).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.port, 8080);
        assert!(config.database.is_none());
        assert_eq!(config.accepted_versions, vec!["v1"]);
    }

    #[test]
    fn database_settings_are_read_when_url_present() {
        let config = load(&[
            ("STOCKLINE_DATABASE_URL", "postgres://localhost/stockline"),
            ("STOCKLINE_DB_MAX_CONNECTIONS", "32"),
            ("STOCKLINE_DB_LOCK_TIMEOUT_MS", "750"),
        ])
        .unwrap();

        let db = config.database.unwrap();
        assert_eq!(db.url, "postgres://localhost/stockline");
        assert_eq!(db.max_connections, 32);
        assert_eq!(db.lock_timeout, Duration::from_millis(750));
        assert_eq!(db.acquire_timeout, Duration::from_secs(5));
    }

    #[test]
    fn accepted_versions_are_split_and_trimmed() {
        let config = load(&[("STOCKLINE_ACCEPTED_VERSIONS", "v1, v2 ,,v3")]).unwrap();
        assert_eq!(config.accepted_versions, vec!["v1", "v2", "v3"]);

        let err = load(&[("STOCKLINE_ACCEPTED_VERSIONS", " , ")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Empty {
                key: "STOCKLINE_ACCEPTED_VERSIONS".to_string()
            }
        );
    }

    #[test]
    fn unparsable_number_names_the_variable() {
        let err = load(&[("STOCKLINE_PORT", "eighty")]).unwrap_err();
        match err {
            ConfigError::Invalid { key, value, .. } => {
                assert_eq!(key, "STOCKLINE_PORT");
                assert_eq!(value, "eighty");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn retry_and_deadline_overrides() {
        let config = load(&[
            ("STOCKLINE_ORDER_DEADLINE_MS", "1200"),
            ("STOCKLINE_RETRY_MAX_ATTEMPTS", "5"),
            ("STOCKLINE_RETRY_BASE_DELAY_MS", "10"),
        ])
        .unwrap();
        assert_eq!(config.order_deadline, Duration::from_millis(1200));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(10));

        assert!(load(&[("STOCKLINE_RETRY_MAX_ATTEMPTS", "0")]).is_err());
    }
}
