//! Configuration module for the order book feed

use anyhow::{bail, Context};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::precision::{BookDepth, Frequency, Precision};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket endpoint of the public feed
    pub ws_endpoint: String,

    /// Instrument to subscribe to (e.g., "tBTCUSD")
    pub symbol: String,

    /// Precision requested on the first subscription
    pub precision: Precision,

    /// Book channel update frequency
    pub frequency: Frequency,

    /// Price levels per side
    pub depth: BookDepth,

    /// Fixed delay before reconnecting after an unclean close
    pub reconnect_delay_ms: u64,

    /// Port of the health check server
    pub health_port: u16,

    /// IPC socket path for publishing notifications; disabled when unset
    pub ipc_socket_path: Option<String>,

    /// Interval between book status log lines
    pub status_log_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from a key lookup; unset keys take defaults, invalid values fail
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let precision = parse_var(&lookup, "PRECISION", defaults.precision)?;
        let frequency = parse_var(&lookup, "FREQUENCY", defaults.frequency)?;
        let depth = BookDepth::new(parse_var(&lookup, "BOOK_DEPTH", defaults.depth.levels())?)?;

        let reconnect_delay_ms =
            parse_var(&lookup, "RECONNECT_DELAY_MS", defaults.reconnect_delay_ms)?;
        if reconnect_delay_ms == 0 {
            bail!("RECONNECT_DELAY_MS must be greater than zero");
        }

        let status_log_interval_secs = parse_var(
            &lookup,
            "STATUS_LOG_INTERVAL_SECS",
            defaults.status_log_interval_secs,
        )?;
        if status_log_interval_secs == 0 {
            bail!("STATUS_LOG_INTERVAL_SECS must be greater than zero");
        }

        Ok(Self {
            ws_endpoint: lookup("WS_ENDPOINT").unwrap_or(defaults.ws_endpoint),
            symbol: lookup("SYMBOL").unwrap_or(defaults.symbol),
            precision,
            frequency,
            depth,
            reconnect_delay_ms,
            health_port: parse_var(&lookup, "HEALTH_PORT", defaults.health_port)?,
            ipc_socket_path: lookup("IPC_SOCKET_PATH").filter(|p| !p.is_empty()),
            status_log_interval_secs,
        })
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn status_log_interval(&self) -> Duration {
        Duration::from_secs(self.status_log_interval_secs.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_endpoint: "wss://api-pub.bitfinex.com/ws/2".to_string(),
            symbol: "tBTCUSD".to_string(),
            precision: Precision::P3,
            frequency: Frequency::F0,
            depth: BookDepth::default(),
            reconnect_delay_ms: 2000,
            health_port: 9090,
            ipc_socket_path: None,
            status_log_interval_secs: 30,
        }
    }
}

/// Parse `key` when set, falling back to `default` when unset
fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} has invalid value \"{}\"", key, value.trim())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load_from(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.precision, Precision::P3);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(2));
        assert_eq!(config.depth.levels(), 25);
        assert!(config.ipc_socket_path.is_none());
    }

    #[test]
    fn test_status_interval_never_zero() {
        let config = Config {
            status_log_interval_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.status_log_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_unset_vars_take_defaults() {
        let config = load_from(&[]).unwrap();
        assert_eq!(config.symbol, "tBTCUSD");
        assert_eq!(config.health_port, 9090);
        assert_eq!(config.reconnect_delay_ms, 2000);
    }

    #[test]
    fn test_valid_overrides() {
        let config = load_from(&[
            ("SYMBOL", "tETHUSD"),
            ("PRECISION", "P1"),
            ("FREQUENCY", "F1"),
            ("BOOK_DEPTH", "100"),
            ("RECONNECT_DELAY_MS", "500"),
            ("HEALTH_PORT", "8081"),
            ("IPC_SOCKET_PATH", ""),
            ("STATUS_LOG_INTERVAL_SECS", " 5 "),
        ])
        .unwrap();
        assert_eq!(config.symbol, "tETHUSD");
        assert_eq!(config.precision, Precision::P1);
        assert_eq!(config.frequency, Frequency::F1);
        assert_eq!(config.depth.levels(), 100);
        assert_eq!(config.reconnect_delay(), Duration::from_millis(500));
        assert_eq!(config.health_port, 8081);
        assert!(config.ipc_socket_path.is_none());
        assert_eq!(config.status_log_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_numbers_fail_loading() {
        assert!(load_from(&[("RECONNECT_DELAY_MS", "soon")]).is_err());
        assert!(load_from(&[("HEALTH_PORT", "70000")]).is_err());
        assert!(load_from(&[("STATUS_LOG_INTERVAL_SECS", "-1")]).is_err());
        assert!(load_from(&[("BOOK_DEPTH", "50")]).is_err());
        assert!(load_from(&[("PRECISION", "P9")]).is_err());
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        let err = load_from(&[("RECONNECT_DELAY_MS", "0")]).unwrap_err();
        assert!(err.to_string().contains("RECONNECT_DELAY_MS"));
        assert!(load_from(&[("STATUS_LOG_INTERVAL_SECS", "0")]).is_err());
    }
}
