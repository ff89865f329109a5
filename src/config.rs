use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

const ENV_ADDR: &str = "WEBMETRICS_ADDR";
const ENV_STATIC_DIR: &str = "WEBMETRICS_STATIC_DIR";
const ENV_STREAM_INTERVAL_MS: &str = "WEBMETRICS_STREAM_INTERVAL_MS";

const DEFAULT_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_STATIC_DIR: &str = "static";
const DEFAULT_STREAM_INTERVAL_MS: u64 = 500;

/// Server settings, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Directory served for unmatched paths.
    pub static_dir: PathBuf,
    /// Tick of the SSE metrics stream.
    pub stream_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(value) = lookup(ENV_ADDR) {
            cfg.bind_addr = value.trim().parse().map_err(|_| ConfigError::InvalidAddr {
                var: ENV_ADDR,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_STATIC_DIR) {
            cfg.static_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_STREAM_INTERVAL_MS) {
            let ms = value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or_else(|| ConfigError::InvalidNumber {
                    var: ENV_STREAM_INTERVAL_MS,
                    value: value.clone(),
                })?;
            cfg.stream_interval = Duration::from_millis(ms);
        }

        Ok(cfg)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.parse().unwrap_or_else(|_| ([0, 0, 0, 0], 3000).into()),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            stream_interval: Duration::from_millis(DEFAULT_STREAM_INTERVAL_MS),
        }
    }
}
