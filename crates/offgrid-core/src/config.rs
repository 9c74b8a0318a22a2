//! Application configuration management.
//!
//! Configuration is stored at `~/.config/offgrid/config.json`. Every field has
//! a default, so a missing file (or a file written by an older version) loads
//! cleanly.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connectivity::Platform;
use crate::error::ConfigError;

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "offgrid";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// How often the monitor re-probes regardless of platform events.
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 30;

/// Upper bound on a single probe. A probe that exceeds it resolves as offline.
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// How often the native backend samples the interface table for link changes.
const DEFAULT_LINK_WATCH_INTERVAL_SECS: u64 = 2;

/// Public DNS resolver; a TCP connect to it is a cheap reachability check.
const DEFAULT_REACHABILITY_HOST: &str = "8.8.8.8:53";

/// Returns 204 with an empty body; the usual captive-portal check endpoint.
const DEFAULT_REACHABILITY_URL: &str = "https://clients3.google.com/generate_204";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub probe_interval_secs: u64,
    pub probe_timeout_secs: u64,
    pub link_watch_interval_secs: u64,
    pub reachability_host: String,
    pub reachability_url: String,
    /// Whether the browser backend issues a HEAD request to confirm reachability
    pub browser_probe: bool,
    /// Pin the backend instead of detecting it from the build target
    pub platform: Option<Platform>,
    pub storage_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            link_watch_interval_secs: DEFAULT_LINK_WATCH_INTERVAL_SECS,
            reachability_host: DEFAULT_REACHABILITY_HOST.to_string(),
            reachability_url: DEFAULT_REACHABILITY_URL.to_string(),
            browser_probe: true,
            platform: None,
            storage_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::MissingDirectory("config"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory backing the durable key/value store.
    pub fn storage_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref dir) = self.storage_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir().ok_or(ConfigError::MissingDirectory("cache"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Apply `OFFGRID_*` environment overrides on top of the loaded file.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(secs) = lookup("OFFGRID_PROBE_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.probe_interval_secs = secs;
        }
        if let Some(secs) = lookup("OFFGRID_PROBE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.probe_timeout_secs = secs;
        }
        if let Some(host) = lookup("OFFGRID_REACHABILITY_HOST") {
            self.reachability_host = host;
        }
        if let Some(url) = lookup("OFFGRID_REACHABILITY_URL") {
            self.reachability_url = url;
        }
        if let Some(platform) = lookup("OFFGRID_PLATFORM") {
            self.platform = Some(platform.parse()?);
        }
        if let Some(dir) = lookup("OFFGRID_STORAGE_DIR") {
            self.storage_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    pub fn probe_interval(&self) -> Duration {
        // A zero interval would make tokio's interval panic
        Duration::from_secs(self.probe_interval_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    pub fn link_watch_interval(&self) -> Duration {
        Duration::from_secs(self.link_watch_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.probe_interval(), Duration::from_secs(30));
        assert_eq!(config.probe_timeout(), Duration::from_secs(5));
        assert!(config.browser_probe);
        assert!(config.platform.is_none());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"probe_interval_secs": 10}"#).unwrap();
        assert_eq!(config.probe_interval_secs, 10);
        assert_eq!(config.probe_timeout_secs, DEFAULT_PROBE_TIMEOUT_SECS);
        assert_eq!(config.reachability_host, DEFAULT_REACHABILITY_HOST);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OFFGRID_PROBE_INTERVAL_SECS", "12"),
            ("OFFGRID_PLATFORM", "browser"),
            ("OFFGRID_STORAGE_DIR", "/tmp/offgrid"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.probe_interval_secs, 12);
        assert_eq!(config.platform, Some(Platform::Browser));
        assert_eq!(config.storage_dir().unwrap(), PathBuf::from("/tmp/offgrid"));
    }

    #[test]
    fn test_env_override_rejects_unknown_platform() {
        let mut config = Config::default();
        let result = config.apply_overrides(|name| {
            (name == "OFFGRID_PLATFORM").then(|| "toaster".to_string())
        });
        assert!(matches!(result, Err(ConfigError::UnknownPlatform(_))));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = Config {
            probe_interval_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.probe_interval(), Duration::from_secs(1));
    }
}
