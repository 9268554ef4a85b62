use std::str::FromStr;
use std::time::Duration;

use crate::model::DeleteMode;

pub const ENV_DATABASE_URL: &str = "TE_DATABASE_URL";
pub const ENV_STATEMENT_TIMEOUT_MS: &str = "TE_STATEMENT_TIMEOUT_MS";
pub const ENV_DEFAULT_PAGE_SIZE: &str = "TE_DEFAULT_PAGE_SIZE";
pub const ENV_MAX_PAGE_SIZE: &str = "TE_MAX_PAGE_SIZE";
pub const ENV_SOFT_DELETE_DEFAULT: &str = "TE_SOFT_DELETE_DEFAULT";

pub const DEFAULT_DATABASE_URL: &str = "sqlite://table_engine.db?mode=rwc";

#[derive(Debug, thiserror::Error)]
#[error("invalid value '{value}' for {key}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

/// Runtime settings. Every field has a default so an empty environment works.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub database_url: String,
    /// Upper bound for a single engine operation.
    pub statement_timeout: Duration,
    pub default_page_size: u64,
    pub max_page_size: u64,
    /// Mode used by `deleteRecord` on soft-delete tables when the caller does not choose.
    pub soft_delete_default: DeleteMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            statement_timeout: Duration::from_millis(30_000),
            default_page_size: 20,
            max_page_size: 100,
            soft_delete_default: DeleteMode::Soft,
        }
    }
}

impl EngineConfig {
    /// Read `TE_*` variables from the process environment (after `.env` is loaded).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database_url = lookup(ENV_DATABASE_URL)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.database_url);
        let timeout_ms: u64 = parse_or(&lookup, ENV_STATEMENT_TIMEOUT_MS, 30_000)?;
        let default_page_size: u64 = parse_or(&lookup, ENV_DEFAULT_PAGE_SIZE, defaults.default_page_size)?;
        let max_page_size: u64 = parse_or(&lookup, ENV_MAX_PAGE_SIZE, defaults.max_page_size)?;
        let soft_delete_default = match lookup(ENV_SOFT_DELETE_DEFAULT) {
            Some(raw) => raw.parse::<DeleteMode>().map_err(|reason| ConfigError {
                key: ENV_SOFT_DELETE_DEFAULT,
                value: raw.clone(),
                reason,
            })?,
            None => defaults.soft_delete_default,
        };

        if timeout_ms == 0 {
            return Err(ConfigError {
                key: ENV_STATEMENT_TIMEOUT_MS,
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if max_page_size == 0 {
            return Err(ConfigError {
                key: ENV_MAX_PAGE_SIZE,
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }

        Ok(Self {
            database_url,
            statement_timeout: Duration::from_millis(timeout_ms),
            default_page_size: default_page_size.clamp(1, max_page_size),
            max_page_size,
            soft_delete_default,
        })
    }

    pub fn timeout_ms(&self) -> u64 {
        self.statement_timeout.as_millis() as u64
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|e: T::Err| ConfigError {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        _ => Ok(default),
    }
}
