use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::{
    datasource::DEFAULT_EXCLUDED_NAMESPACE, models::DEFAULT_CACHE_TIMEOUT, poller::PollSettings,
    DataSourceError, Result,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base URL of the notebook, test monitor and auth services.
    pub api_url: String,
    pub port: u16,
    pub poll: PollSettings,
    pub request_timeout: Duration,
    pub default_cache_timeout: u64,
    pub excluded_namespace: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("NOTEBOOK_API_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| DataSourceError::Config("NOTEBOOK_API_URL must be set".to_string()))?;

        let port = parse(&lookup, "PORT")?.unwrap_or(8080);
        let interval_ms: u64 = parse(&lookup, "POLL_INTERVAL_MS")?.unwrap_or(3000);
        let max_attempts: Option<u32> = parse(&lookup, "MAX_POLL_ATTEMPTS")?;
        if max_attempts == Some(0) {
            return Err(DataSourceError::Config(
                "MAX_POLL_ATTEMPTS must be at least 1; leave it unset to poll without a limit"
                    .to_string(),
            ));
        }
        let timeout_secs: u64 = parse(&lookup, "REQUEST_TIMEOUT_SECS")?.unwrap_or(30);
        let default_cache_timeout =
            parse(&lookup, "DEFAULT_CACHE_TIMEOUT_SECS")?.unwrap_or(DEFAULT_CACHE_TIMEOUT);
        let excluded_namespace = lookup("EXCLUDED_NAMESPACE")
            .unwrap_or_else(|| DEFAULT_EXCLUDED_NAMESPACE.to_string());

        Ok(Self {
            api_url,
            port,
            poll: PollSettings {
                interval: Duration::from_millis(interval_ms),
                max_attempts,
            },
            request_timeout: Duration::from_secs(timeout_secs),
            default_cache_timeout,
            excluded_namespace,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| DataSourceError::Config(format!("Invalid {} '{}': {}", key, raw, e))),
    }
}
