use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Weekday;
use chrono_tz::Tz;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub alt_channel: AltChannelConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub sqlite_path: PathBuf,
    pub destinations_path: PathBuf,
}

/// Gating options for the filter pipeline. Passed explicitly into every
/// `should_dispatch` call; there is no process-wide copy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Reference zone for the active-hours window and the weekday check.
    pub timezone: Tz,
    /// Inclusive start hour of the alert window, local to `timezone`.
    pub active_start_hour: u32,
    /// Exclusive end hour of the alert window.
    pub active_end_hour: u32,
    pub non_trading_days: Vec<Weekday>,
    pub dev_mode: bool,
    pub test_mode: bool,
    pub ignore_time_filter: bool,
    pub ignore_weekend_filter: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::America::Los_Angeles,
            active_start_hour: 6,
            active_end_hour: 13,
            non_trading_days: vec![Weekday::Sat, Weekday::Sun],
            dev_mode: false,
            test_mode: false,
            ignore_time_filter: false,
            ignore_weekend_filter: false,
        }
    }
}

impl FilterConfig {
    /// Dev and test runs skip the market-hours gates but never the toggles.
    pub fn bypass_market_hours(&self) -> bool {
        self.dev_mode || self.test_mode
    }

    pub fn validate(&self) -> Result<()> {
        if self.active_start_hour > 23 {
            bail!(
                "filter.active_start_hour must be 0..=23, got {}",
                self.active_start_hour
            );
        }
        if self.active_end_hour > 24 || self.active_end_hour <= self.active_start_hour {
            bail!(
                "filter.active_end_hour must be in ({}, 24], got {}",
                self.active_start_hour,
                self.active_end_hour
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub timeout_ms: u64,
    /// Per-destination queue depth; alerts beyond it are dropped with a warning.
    pub queue_depth: usize,
    /// Trailing line appended to rendered alerts. Empty disables it.
    pub mention: String,
    #[serde(skip)]
    pub default_webhook_url: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            queue_depth: 64,
            mention: "@everyone".to_string(),
            default_webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AltChannelConfig {
    pub enabled: bool,
    #[serde(skip)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn config_path() -> PathBuf {
    std::env::var("CA_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config/default.toml"))
}

fn env_flag(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let path = config_path();
        let mut config = Self::from_path(&path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&config_str).with_context(|| format!("failed to parse {}", path.display()))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        self.dispatch.default_webhook_url = non_empty_env("DISCORD_WEBHOOK_URL");
        self.alt_channel.webhook_url = non_empty_env("ALT_CHANNEL_WEBHOOK_URL");

        if let Some(port) = non_empty_env("PORT") {
            let port: u16 = port
                .parse()
                .with_context(|| format!("PORT '{}' is not a valid port", port))?;
            let mut addr = self.bind_addr()?;
            addr.set_port(port);
            self.server.bind = addr.to_string();
        }
        if let Some(dev) = env_flag("CA_DEV_MODE") {
            self.filter.dev_mode = dev;
        }
        if let Some(test) = env_flag("CA_TEST_MODE") {
            self.filter.test_mode = test;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;
        self.filter.validate()?;
        if self.dispatch.timeout_ms == 0 {
            bail!("dispatch.timeout_ms must be > 0");
        }
        if self.dispatch.queue_depth == 0 {
            bail!("dispatch.queue_depth must be > 0");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .with_context(|| format!("server.bind '{}' is not a socket address", self.server.bind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_flag_accepts_common_spellings() {
        std::env::set_var("CA_TEST_FLAG_ON", "Yes");
        std::env::set_var("CA_TEST_FLAG_OFF", "0");
        std::env::set_var("CA_TEST_FLAG_BAD", "maybe");
        assert_eq!(env_flag("CA_TEST_FLAG_ON"), Some(true));
        assert_eq!(env_flag("CA_TEST_FLAG_OFF"), Some(false));
        assert_eq!(env_flag("CA_TEST_FLAG_BAD"), None);
        assert_eq!(env_flag("CA_TEST_FLAG_MISSING"), None);
    }

    #[test]
    fn filter_window_validation() {
        let mut cfg = FilterConfig::default();
        assert!(cfg.validate().is_ok());
        cfg.active_end_hour = cfg.active_start_hour;
        assert!(cfg.validate().is_err());
        cfg.active_start_hour = 24;
        cfg.active_end_hour = 24;
        assert!(cfg.validate().is_err());
    }
}
