//! CLI configuration.
//!
//! Stored as TOML at `~/.config/devpanel/config.toml` unless `--config`
//! points elsewhere. Missing fields take their defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use devpanel_apscan::ScanConfig;
use devpanel_ota::OtaConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// OTA endpoint on the device.
    #[serde(default = "default_ota_url")]
    pub ota_url: String,

    /// AP scan endpoint on the device.
    #[serde(default = "default_apscan_url")]
    pub apscan_url: String,

    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Scan poll interval while the device is scanning.
    #[serde(default = "default_scan_poll_interval")]
    pub scan_poll_interval_secs: u64,

    /// Scan poll interval once results are in.
    #[serde(default = "default_scan_idle_interval")]
    pub scan_idle_interval_secs: u64,

    /// Timeout for probes and scans; uploads only time out while connecting.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_ota_url() -> String {
    "http://192.168.4.1/ota".into()
}

fn default_apscan_url() -> String {
    "http://192.168.4.1/apscan".into()
}

fn default_probe_interval() -> u64 {
    10
}

fn default_scan_poll_interval() -> u64 {
    3
}

fn default_scan_idle_interval() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ota_url: default_ota_url(),
            apscan_url: default_apscan_url(),
            probe_interval_secs: default_probe_interval(),
            scan_poll_interval_secs: default_scan_poll_interval(),
            scan_idle_interval_secs: default_scan_idle_interval(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Config {
    /// Loads `path`, or the default location when `None`.
    ///
    /// An explicit path must exist. A missing file at the default location
    /// is created with default values.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = path {
            return Self::load_from(path);
        }

        let path = config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Config::default();
            if let Err(e) = config.save_to(&path) {
                tracing::debug!(error = %e, "could not write default configuration");
            }
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// OTA manager settings, with `url` overriding the configured endpoint.
    /// Intervals are at least one second.
    pub fn ota_config(&self, url: Option<&str>) -> OtaConfig {
        let mut config = OtaConfig::new(url.unwrap_or(&self.ota_url));
        config.probe_interval = Duration::from_secs(self.probe_interval_secs.max(1));
        config
    }

    pub fn scan_config(&self, url: Option<&str>) -> ScanConfig {
        let mut config = ScanConfig::new(url.unwrap_or(&self.apscan_url));
        config.poll_interval = Duration::from_secs(self.scan_poll_interval_secs.max(1));
        config.idle_interval = Duration::from_secs(self.scan_idle_interval_secs.max(1));
        config
    }
}

fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("devpanel").join("config.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("devpanel")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.ota_url, "http://192.168.4.1/ota");
        assert_eq!(config.apscan_url, "http://192.168.4.1/apscan");
        assert_eq!(config.probe_interval_secs, 10);
        assert_eq!(config.scan_poll_interval_secs, 3);
        assert_eq!(config.scan_idle_interval_secs, 10);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config: Config = toml::from_str(r#"ota_url = "http://10.0.0.7/ota""#).unwrap();
        assert_eq!(config.ota_url, "http://10.0.0.7/ota");
        assert_eq!(config.apscan_url, "http://192.168.4.1/apscan");
        assert_eq!(config.probe_interval_secs, 10);
    }

    #[test]
    fn save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.toml");
        let config = Config {
            probe_interval_secs: 5,
            ..Config::default()
        };

        config.save_to(&path).unwrap();
        let loaded = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("absent.toml");
        let err = Config::load(Some(path.as_path())).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "probe_interval_secs = \"soon\"").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn widget_configs_follow_settings() {
        let config = Config {
            probe_interval_secs: 4,
            scan_poll_interval_secs: 1,
            scan_idle_interval_secs: 20,
            ..Config::default()
        };

        let ota = config.ota_config(None);
        assert_eq!(ota.url, "http://192.168.4.1/ota");
        assert_eq!(ota.probe_interval, Duration::from_secs(4));

        let ota = config.ota_config(Some("http://dev/ota"));
        assert_eq!(ota.url, "http://dev/ota");

        let scan = config.scan_config(None);
        assert_eq!(scan.poll_interval, Duration::from_secs(1));
        assert_eq!(scan.idle_interval, Duration::from_secs(20));
    }

    #[test]
    fn config_path_mentions_devpanel() {
        assert!(config_path().to_string_lossy().contains("devpanel"));
    }
}
