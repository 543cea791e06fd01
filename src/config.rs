use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Client-wide settings.
///
/// Every field has a default, so a YAML file only needs the values it changes:
///
/// ```yaml
/// connect_timeout_ms: 2000
/// max_requests_per_host: 8
/// follow_redirects: false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub follow_redirects: bool,
    pub retry_on_connection_failure: bool,
    /// Re-attempts after recoverable connection failures, per call.
    pub max_retries: u32,
    pub max_requests: usize,
    pub max_requests_per_host: usize,
    pub max_idle_connections: usize,
    pub keep_alive_secs: u64,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            read_timeout_ms: 10_000,
            write_timeout_ms: 10_000,
            follow_redirects: true,
            retry_on_connection_failure: true,
            max_retries: 3,
            max_requests: 64,
            max_requests_per_host: 5,
            max_idle_connections: 5,
            keep_alive_secs: 5 * 60,
            user_agent: concat!("courier/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Loads the file named by `COURIER_CONFIG`, or the defaults when it is unset.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var("COURIER_CONFIG") {
            Ok(path) => Self::from_file(path),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(raw).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.max_requests >= 1, "max_requests must be at least 1");
        anyhow::ensure!(
            self.max_requests_per_host >= 1,
            "max_requests_per_host must be at least 1"
        );
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}
