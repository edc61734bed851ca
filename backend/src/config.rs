use std::env;

use chrono_tz::Tz;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    InvalidValue {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    /// Accept tokens whose signature cannot be checked
    pub allow_unverified_tokens: bool,
    /// Zone in which recurrence dates and due days are evaluated
    pub scheduler_timezone: Tz,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("PORT", "8080", "a port number")?,
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:todo.db?mode=rwc".to_string()),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "development-secret-key-change-in-production".to_string()),
            allow_unverified_tokens: parse_var("ALLOW_UNVERIFIED_TOKENS", "false", "true or false")?,
            scheduler_timezone: parse_var("SCHEDULER_TIMEZONE", "UTC", "an IANA time zone name")?,
            cors_origins: env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "http://localhost".to_string())
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: &str, expected: &'static str) -> Result<T, ConfigError> {
    let value = env::var(name).unwrap_or_else(|_| default.to_string());
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { name, expected, value })
}
