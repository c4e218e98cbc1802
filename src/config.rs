use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("secret {0} is neither in the environment nor in /run/secrets")]
    MissingSecret(&'static str),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub api_base_url: String,
    pub allowed_origin: String,
    pub request_timeout: Duration,
    pub default_currency: String,
    pub session_secret: String,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            port: try_load("PORT", "3000")?,
            api_base_url: try_load("FISTEIN_API_BASE_URL", "http://localhost:8080/api")?,
            allowed_origin: try_load("FISTEIN_ALLOWED_ORIGIN", "http://localhost:5173")?,
            request_timeout: Duration::from_secs(try_load("FISTEIN_REQUEST_TIMEOUT_SECS", "10")?),
            default_currency: try_load("FISTEIN_DEFAULT_CURRENCY", "TRY")?,
            session_secret: read_secret("FISTEIN_SESSION_SECRET")?,
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    parse(key, value)
}

fn parse<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    value.trim().parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }
    })
}

fn read_secret(secret_name: &'static str) -> Result<String, ConfigError> {
    if let Some(secret) = var(secret_name).filter(|s| !s.trim().is_empty()) {
        return Ok(secret.trim().to_string());
    }

    let path = format!("/run/secrets/{secret_name}");
    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            warn!("Failed to read {secret_name} from environment or {path}");
            ConfigError::MissingSecret(secret_name)
        })
}
