//! Process configuration read from the environment.

use std::str::FromStr;
use std::time::Duration;

use storyloom_progression::config::ProgressionConfig;
use storyloom_progression::domain::phase::MAX_PHASE_TIME_MS;

use crate::error::AppError;

/// Settings for the API process.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `PostgreSQL` connection string.
    pub database_url: String,
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Upper bound of the connection pool.
    pub db_max_connections: u32,
    /// Engine tunables.
    pub progression: ProgressionConfig,
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid ({raw:?}): {e}"))),
    }
}

fn phase_ms(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: i64,
) -> Result<i64, AppError> {
    let value = parse_or(lookup, key, default)?;
    if value <= 0 || value > MAX_PHASE_TIME_MS {
        return Err(AppError::Config(format!(
            "{key} must be between 1 and {MAX_PHASE_TIME_MS}, got {value}"
        )));
    }
    Ok(value)
}

impl AppConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is missing or any value
    /// fails to parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is missing or any value
    /// fails to parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                AppError::Config("DATABASE_URL environment variable must be set".to_owned())
            })?;
        let defaults = ProgressionConfig::default();
        let min_remaining_ms = parse_or(
            &lookup,
            "MIN_REMAINING_MS",
            u64::try_from(defaults.min_remaining.as_millis()).unwrap_or(u64::MAX),
        )?;

        Ok(Self {
            database_url,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parse_or(&lookup, "PORT", 3000)?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            progression: ProgressionConfig {
                min_remaining: Duration::from_millis(min_remaining_ms),
                default_proposal_time_ms: phase_ms(
                    &lookup,
                    "DEFAULT_PROPOSAL_TIME_MS",
                    defaults.default_proposal_time_ms,
                )?,
                default_voting_time_ms: phase_ms(
                    &lookup,
                    "DEFAULT_VOTING_TIME_MS",
                    defaults.default_voting_time_ms,
                )?,
                ..defaults
            },
        })
    }

    /// `host:port` as given.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
