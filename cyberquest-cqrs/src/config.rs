//! Bus configuration

use cyberquest_config::{ConfigError, ConfigManager, ConfigValidator, Validate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration key for [`BusConfig::allow_replace`]
pub const KEY_ALLOW_REPLACE: &str = "cqrs_allow_replace";
/// Configuration key for [`BusConfig::enable_logging`]
pub const KEY_ENABLE_LOGGING: &str = "cqrs_enable_logging";
/// Configuration key for [`BusConfig::slow_dispatch_ms`]
pub const KEY_SLOW_DISPATCH_MS: &str = "cqrs_slow_dispatch_ms";

const MAX_SLOW_DISPATCH_MS: u64 = 60 * 60 * 1000;

/// Command/query bus configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Re-registering a type tag replaces the previous handler
    pub allow_replace: bool,

    /// Install the tracing observer
    pub enable_logging: bool,

    /// Dispatches slower than this are logged at warn level (0 disables)
    pub slow_dispatch_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            allow_replace: true,
            enable_logging: true,
            slow_dispatch_ms: 1000,
        }
    }
}

impl BusConfig {
    /// Read the bus settings from a configuration manager.
    ///
    /// Missing keys fall back to [`BusConfig::default`]; values of the wrong
    /// type are an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use cyberquest_config::ConfigManager;
    /// use cyberquest_cqrs::BusConfig;
    ///
    /// let manager = ConfigManager::new();
    /// manager.set("cqrs_allow_replace", false).unwrap();
    ///
    /// let config = BusConfig::from_config(&manager).unwrap();
    /// assert!(!config.allow_replace);
    /// assert!(config.enable_logging);
    /// ```
    pub fn from_config(manager: &ConfigManager) -> cyberquest_config::Result<Self> {
        let defaults = Self::default();
        let config = Self {
            allow_replace: setting(manager, KEY_ALLOW_REPLACE, defaults.allow_replace)?,
            enable_logging: setting(manager, KEY_ENABLE_LOGGING, defaults.enable_logging)?,
            slow_dispatch_ms: setting(manager, KEY_SLOW_DISPATCH_MS, defaults.slow_dispatch_ms)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Slow dispatch threshold, if enabled
    pub fn slow_dispatch_threshold(&self) -> Option<Duration> {
        (self.slow_dispatch_ms > 0).then(|| Duration::from_millis(self.slow_dispatch_ms))
    }

    pub fn with_allow_replace(mut self, allow: bool) -> Self {
        self.allow_replace = allow;
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.enable_logging = enabled;
        self
    }

    pub fn with_slow_dispatch_ms(mut self, ms: u64) -> Self {
        self.slow_dispatch_ms = ms;
        self
    }
}

fn setting<T: DeserializeOwned>(
    manager: &ConfigManager,
    key: &str,
    default: T,
) -> cyberquest_config::Result<T> {
    match manager.get(key) {
        Ok(value) => Ok(value),
        Err(ConfigError::KeyNotFound(_)) => Ok(default),
        Err(err) => Err(err),
    }
}

impl Validate for BusConfig {
    fn validate(&self) -> cyberquest_config::Result<()> {
        ConfigValidator::in_range(
            self.slow_dispatch_ms,
            0,
            MAX_SLOW_DISPATCH_MS,
            KEY_SLOW_DISPATCH_MS,
        )
    }
}
