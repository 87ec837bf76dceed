//! Configuration for the connector service.
//!
//! All settings come from environment variables (a `.env` file is loaded at
//! startup). The gateway base URL is the only required value.
//!
//! Environment variables used:
//! - `ETHCONNECT_URL` — base URL of the RPC gateway (required)
//! - `FFTM_URL` — alternate URL for transaction submission; falls back to `ETHCONNECT_URL`
//! - `ETHCONNECT_USERNAME` / `ETHCONNECT_PASSWORD` — basic auth for the gateway
//! - `FACTORY_CONTRACT_ADDRESS` — token factory used by pool deployment
//! - `PASSTHROUGH_HEADERS` — comma-separated inbound headers forwarded to the gateway
//! - `TOPIC` — event stream topic, also the subscription name prefix
//! - `HOST`, `PORT` — bind address

use std::env;
use std::net::IpAddr;
use url::Url;

const ENV_ETHCONNECT_URL: &str = "ETHCONNECT_URL";
const ENV_FFTM_URL: &str = "FFTM_URL";
const ENV_ETHCONNECT_USERNAME: &str = "ETHCONNECT_USERNAME";
const ENV_ETHCONNECT_PASSWORD: &str = "ETHCONNECT_PASSWORD";
const ENV_FACTORY_ADDRESS: &str = "FACTORY_CONTRACT_ADDRESS";
const ENV_PASSTHROUGH_HEADERS: &str = "PASSTHROUGH_HEADERS";
const ENV_TOPIC: &str = "TOPIC";

pub const DEFAULT_TOPIC: &str = "tokens";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("env {0} not set")]
    Missing(&'static str),
    #[error("env {0} is not a valid URL: {1}")]
    InvalidUrl(&'static str, url::ParseError),
}

/// Resolved service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub ethconnect_url: Url,
    pub fftm_url: Option<Url>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub factory_address: Option<String>,
    pub passthrough_headers: Vec<String>,
    pub topic: String,
}

impl Config {
    /// Reads the configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let ethconnect_url = require_url(ENV_ETHCONNECT_URL)?;
        let fftm_url = optional_url(ENV_FFTM_URL)?;
        let passthrough_headers = env::var(ENV_PASSTHROUGH_HEADERS)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .map(str::to_lowercase)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Config {
            host: config_defaults::default_host(),
            port: config_defaults::default_port(),
            ethconnect_url,
            fftm_url,
            username: non_empty(ENV_ETHCONNECT_USERNAME),
            password: non_empty(ENV_ETHCONNECT_PASSWORD),
            factory_address: non_empty(ENV_FACTORY_ADDRESS).map(|a| a.to_lowercase()),
            passthrough_headers,
            topic: non_empty(ENV_TOPIC).unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
        })
    }
}

fn require_url(key: &'static str) -> Result<Url, ConfigError> {
    let raw = env::var(key).map_err(|_| ConfigError::Missing(key))?;
    Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(key, e))
}

fn optional_url(key: &'static str) -> Result<Option<Url>, ConfigError> {
    match env::var(key) {
        Ok(raw) if !raw.is_empty() => Url::parse(&raw)
            .map(Some)
            .map_err(|e| ConfigError::InvalidUrl(key, e)),
        _ => Ok(None),
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

pub mod config_defaults {
    use std::env;
    use std::net::IpAddr;

    pub const DEFAULT_PORT: u16 = 3000;
    pub const DEFAULT_HOST: &str = "0.0.0.0";

    /// Returns the default port value with fallback: $PORT env var -> 3000
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// Returns the default host value with fallback: $HOST env var -> "0.0.0.0"
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(DEFAULT_HOST.parse().unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn restore_env(key: &str, original: Option<String>) {
        if let Some(value) = original {
            // Safety: guarded by `ENV_LOCK`, so no concurrent environment mutation occurs.
            unsafe { env::set_var(key, value) };
        } else {
            // Safety: guarded by `ENV_LOCK`, so no concurrent environment mutation occurs.
            unsafe { env::remove_var(key) };
        }
    }

    #[test]
    fn test_from_env() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        let original_url = env::var(ENV_ETHCONNECT_URL).ok();
        let original_headers = env::var(ENV_PASSTHROUGH_HEADERS).ok();
        let original_topic = env::var(ENV_TOPIC).ok();

        // Safety: guarded by `ENV_LOCK`, so no concurrent environment mutation occurs.
        unsafe {
            env::set_var(ENV_ETHCONNECT_URL, "http://ethconnect.example:5102");
            env::set_var(ENV_PASSTHROUGH_HEADERS, "X-Custom-A, X-Custom-B");
            env::remove_var(ENV_TOPIC);
        }

        let config = Config::from_env().expect("config loads");
        assert_eq!(config.ethconnect_url.as_str(), "http://ethconnect.example:5102/");
        assert_eq!(config.passthrough_headers, vec!["x-custom-a", "x-custom-b"]);
        assert_eq!(config.topic, DEFAULT_TOPIC);
        assert_eq!(config.fftm_url, None);

        restore_env(ENV_ETHCONNECT_URL, original_url);
        restore_env(ENV_PASSTHROUGH_HEADERS, original_headers);
        restore_env(ENV_TOPIC, original_topic);
    }

    #[test]
    fn test_missing_gateway_url() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        let original_url = env::var(ENV_ETHCONNECT_URL).ok();

        // Safety: guarded by `ENV_LOCK`, so no concurrent environment mutation occurs.
        unsafe { env::remove_var(ENV_ETHCONNECT_URL) };

        assert!(Config::from_env().is_err());

        restore_env(ENV_ETHCONNECT_URL, original_url);
    }
}
