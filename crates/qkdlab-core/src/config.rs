//! Client-side configuration for talking to a simulation engine.

use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_ENGINE_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Trailing window kept by every chart series.
pub const DEFAULT_CHART_WINDOW: usize = 20;
pub const DEFAULT_MAX_POLL_FAILURES: u32 = 5;
pub const DEFAULT_NOTIFICATION_TTL: Duration = Duration::from_secs(4);

pub const ENV_ENGINE_URL: &str = "QKDLAB_ENGINE_URL";
pub const ENV_POLL_INTERVAL_MS: &str = "QKDLAB_POLL_INTERVAL_MS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "QKDLAB_REQUEST_TIMEOUT_SECS";
pub const ENV_MAX_POLL_FAILURES: &str = "QKDLAB_MAX_POLL_FAILURES";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the engine, without a trailing slash.
    pub engine_url: String,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub chart_window: usize,
    /// Consecutive poll transport failures tolerated before a run is dropped.
    pub max_poll_failures: u32,
    pub notification_ttl: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            engine_url: DEFAULT_ENGINE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            chart_window: DEFAULT_CHART_WINDOW,
            max_poll_failures: DEFAULT_MAX_POLL_FAILURES,
            notification_ttl: DEFAULT_NOTIFICATION_TTL,
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `QKDLAB_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = get(ENV_ENGINE_URL) {
            config = config.with_engine_url(&url)?;
        }
        if let Some(ms) = get(ENV_POLL_INTERVAL_MS) {
            config.poll_interval = Duration::from_millis(positive(ENV_POLL_INTERVAL_MS, &ms)?);
        }
        if let Some(secs) = get(ENV_REQUEST_TIMEOUT_SECS) {
            config.request_timeout =
                Duration::from_secs(positive(ENV_REQUEST_TIMEOUT_SECS, &secs)?);
        }
        if let Some(n) = get(ENV_MAX_POLL_FAILURES) {
            let n = positive(ENV_MAX_POLL_FAILURES, &n)?;
            config.max_poll_failures = u32::try_from(n).unwrap_or(u32::MAX);
        }
        Ok(config)
    }

    pub fn with_engine_url(mut self, url: &str) -> Result<Self, ConfigError> {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(url.to_string()));
        }
        self.engine_url = url.trim_end_matches('/').to_string();
        Ok(self)
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.engine_url, path.trim_start_matches('/'))
    }
}

fn positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    let n: u64 = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber {
            var,
            value: value.to_string(),
        })?;
    if n == 0 {
        return Err(ConfigError::Zero { var });
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.chart_window, 20);
        assert_eq!(config.max_poll_failures, 5);
    }

    #[test]
    fn env_overrides_apply() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_ENGINE_URL, "http://engine:8080/"),
            (ENV_POLL_INTERVAL_MS, "250"),
            (ENV_REQUEST_TIMEOUT_SECS, "3"),
            (ENV_MAX_POLL_FAILURES, "2"),
        ]))
        .unwrap();
        assert_eq!(config.engine_url, "http://engine:8080");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.max_poll_failures, 2);
        assert_eq!(
            config.endpoint("/api/get_continuous_data"),
            "http://engine:8080/api/get_continuous_data"
        );
    }

    #[test]
    fn empty_values_are_ignored() {
        let config = ClientConfig::from_lookup(lookup(&[(ENV_POLL_INTERVAL_MS, "  ")])).unwrap();
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert_eq!(
            ClientConfig::from_lookup(lookup(&[(ENV_POLL_INTERVAL_MS, "0")])),
            Err(ConfigError::Zero {
                var: ENV_POLL_INTERVAL_MS
            })
        );
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[(ENV_MAX_POLL_FAILURES, "many")])),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[(ENV_ENGINE_URL, "engine:5000")])),
            Err(ConfigError::InvalidUrl(_))
        ));
    }
}
