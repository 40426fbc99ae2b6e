//! Kiosk configuration loaded from `kiosk.toml`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KioskError, Result};

/// Environment variable overriding [`KioskConfig::helper_address`].
pub const ENV_HELPER_ADDRESS: &str = "KIOSK_HELPER_ADDRESS";

/// Environment variable overriding [`KioskConfig::app_id`].
pub const ENV_APP_ID: &str = "KIOSK_APP_ID";

/// Runtime configuration for one kiosk app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KioskConfig {
    /// Name of the app this process runs (`infostation`, `media_player`, ...).
    pub app_id: String,
    /// Base URL of the local helper.
    pub helper_address: String,
    /// Interval between `/getUpdate` polls once bootstrapped.
    pub helper_poll_interval_ms: u64,
    /// Timeout for each `/getUpdate` poll.
    pub helper_poll_timeout_ms: u64,
    /// Timeout for each `/getDefaults` bootstrap attempt.
    pub bootstrap_timeout_ms: u64,
    /// Delay before retrying a failed bootstrap.
    pub bootstrap_retry_ms: u64,
    /// Interval between control server pings.
    pub server_ping_interval_ms: u64,
    /// Timeout for each control server ping.
    pub server_ping_timeout_ms: u64,
    /// How long a user interaction keeps `currentInteraction` true.
    pub interaction_window_ms: u64,
    /// Use the legacy `POST {action: "getDefaults"}` bootstrap.
    pub legacy_helper: bool,
    /// The app fetches its own definition, so server-sent definition ids
    /// must not trigger a reload.
    pub self_managed_definition: bool,
    /// Page path used when a definition declares the `other` app.
    pub other_app_path: Option<String>,
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            app_id: "infostation".to_string(),
            helper_address: "http://localhost:8000".to_string(),
            helper_poll_interval_ms: 1000,
            helper_poll_timeout_ms: 500,
            bootstrap_timeout_ms: 2000,
            bootstrap_retry_ms: 500,
            server_ping_interval_ms: 5000,
            server_ping_timeout_ms: 2000,
            interaction_window_ms: 30_000,
            legacy_helper: false,
            self_managed_definition: false,
            other_app_path: None,
        }
    }
}

impl KioskConfig {
    /// Parse a config from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: Self =
            toml::from_str(text).map_err(|e| KioskError::Config(format!("kiosk.toml: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        log::debug!("Loaded config from {}", path.display());
        Self::from_toml_str(&text)
    }

    /// Apply `KIOSK_HELPER_ADDRESS` / `KIOSK_APP_ID` if set.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (env vars in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(addr) = lookup(ENV_HELPER_ADDRESS).filter(|v| !v.trim().is_empty()) {
            self.helper_address = addr.trim().to_string();
        }
        if let Some(app) = lookup(ENV_APP_ID).filter(|v| !v.trim().is_empty()) {
            self.app_id = app.trim().to_string();
        }
        self.validate()
    }

    /// Reject configurations the runtime cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.app_id.trim().is_empty() {
            return Err(KioskError::Config("app_id is empty".into()));
        }
        if !self.helper_address.starts_with("http://") {
            return Err(KioskError::Config(format!(
                "helper_address must be an http:// URL: {}",
                self.helper_address
            )));
        }
        let intervals = [
            ("helper_poll_interval_ms", self.helper_poll_interval_ms),
            ("helper_poll_timeout_ms", self.helper_poll_timeout_ms),
            ("bootstrap_timeout_ms", self.bootstrap_timeout_ms),
            ("bootstrap_retry_ms", self.bootstrap_retry_ms),
            ("server_ping_interval_ms", self.server_ping_interval_ms),
            ("server_ping_timeout_ms", self.server_ping_timeout_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(KioskError::Config(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }

    pub fn helper_poll_interval(&self) -> Duration {
        Duration::from_millis(self.helper_poll_interval_ms)
    }

    pub fn helper_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.helper_poll_timeout_ms)
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_millis(self.bootstrap_timeout_ms)
    }

    pub fn bootstrap_retry(&self) -> Duration {
        Duration::from_millis(self.bootstrap_retry_ms)
    }

    pub fn server_ping_interval(&self) -> Duration {
        Duration::from_millis(self.server_ping_interval_ms)
    }

    pub fn server_ping_timeout(&self) -> Duration {
        Duration::from_millis(self.server_ping_timeout_ms)
    }

    pub fn interaction_window(&self) -> Duration {
        Duration::from_millis(self.interaction_window_ms)
    }
}
