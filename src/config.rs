use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use time::UtcOffset;

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set; export it or add it to .env")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl GeminiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: String,
    pub gemini: GeminiConfig,
    /// Offset used to decide which calendar day a meal belongs to.
    pub history_offset: UtcOffset,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GEMINI_API_KEY")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("GEMINI_API_KEY"))?;

        let gemini = GeminiConfig {
            api_key,
            model: lookup("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.into()),
            base_url: lookup("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            timeout_secs: parse_or("ESTIMATOR_TIMEOUT_SECS", lookup("ESTIMATOR_TIMEOUT_SECS"), 60)?,
        };
        if gemini.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "ESTIMATOR_TIMEOUT_SECS",
                value: "0".into(),
                reason: "timeout must be at least one second".into(),
            });
        }

        let offset_minutes: i32 = parse_or(
            "HISTORY_UTC_OFFSET_MINUTES",
            lookup("HISTORY_UTC_OFFSET_MINUTES"),
            0,
        )?;
        let history_offset = UtcOffset::from_whole_seconds(offset_minutes.saturating_mul(60))
            .map_err(|e| ConfigError::Invalid {
                name: "HISTORY_UTC_OFFSET_MINUTES",
                value: offset_minutes.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            database_path: lookup("DATABASE_PATH").unwrap_or_else(|| "nutrition.db".into()),
            gemini,
            history_offset,
        })
    }
}

fn parse_or<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        }),
    }
}
