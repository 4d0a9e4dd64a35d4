//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use at_gateway::GatewayConfig;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::monitor::MonitorSettings;

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Path to the JSON whitelist of `{name, MAC}` entries.
    pub whitelist_path: PathBuf,
    /// Directory for daily-rotated log files. Logs go to stderr only when unset.
    pub log_dir: Option<PathBuf>,
    /// Gateway address, e.g. `192.168.1.1`.
    pub gateway_host: String,
    pub gateway_username: String,
    pub gateway_password: Option<String>,
    /// Shared key mixed into the login challenge.
    pub gateway_key: String,
    pub gateway_logtype: u32,
    pub request_timeout_secs: u64,
    /// Assumed gateway session lifetime.
    pub session_ttl_secs: u64,
    pub poll_interval_secs: u64,
    /// Pause after a failed tick.
    pub error_backoff_secs: u64,
    /// Maximum gap for extending an interval.
    pub merge_threshold_secs: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("whitelist_path", &self.whitelist_path)
            .field("log_dir", &self.log_dir)
            .field("gateway_host", &self.gateway_host)
            .field("gateway_username", &self.gateway_username)
            .field(
                "gateway_password",
                &self.gateway_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("gateway_logtype", &self.gateway_logtype)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("error_backoff_secs", &self.error_backoff_secs)
            .field("merge_threshold_secs", &self.merge_threshold_secs)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        let config_dir = dirs_config_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("attend.db"),
            whitelist_path: config_dir.join("userlist.json"),
            log_dir: None,
            gateway_host: "192.168.1.1".to_string(),
            gateway_username: at_gateway::DEFAULT_USERNAME.to_string(),
            gateway_password: None,
            gateway_key: at_gateway::DEFAULT_KEY.to_string(),
            gateway_logtype: at_gateway::DEFAULT_LOGTYPE,
            request_timeout_secs: at_gateway::DEFAULT_TIMEOUT.as_secs(),
            session_ttl_secs: at_gateway::DEFAULT_SESSION_TTL.as_secs(),
            poll_interval_secs: 300,
            error_backoff_secs: 60,
            merge_threshold_secs: 30 * 60,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (ATTEND_*)
        figment = figment.merge(Env::prefixed("ATTEND_"));

        figment.extract()
    }

    /// Builds the gateway login configuration.
    ///
    /// Fails when no gateway password is configured.
    pub fn gateway_config(&self) -> Result<GatewayConfig> {
        let password = self
            .gateway_password
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .context("missing gateway password (set ATTEND_GATEWAY_PASSWORD or config.toml)")?;
        Ok(GatewayConfig {
            username: self.gateway_username.clone(),
            password: password.to_string(),
            key: self.gateway_key.clone(),
            logtype: self.gateway_logtype,
            session_ttl: Duration::from_secs(self.session_ttl_secs),
        })
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn merge_threshold(&self) -> Result<chrono::Duration> {
        let secs = i64::try_from(self.merge_threshold_secs)
            .context("merge_threshold_secs is too large")?;
        Ok(chrono::Duration::seconds(secs))
    }

    pub const fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            error_backoff: Duration::from_secs(self.error_backoff_secs),
        }
    }
}

/// Returns the platform-specific config directory for attend.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("attend"))
}

/// Returns the platform-specific data directory for attend.
///
/// On Linux: `~/.local/share/attend`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("attend"))
}
