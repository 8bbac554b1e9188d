mod host;

pub use host::HostConfig;

use std::path::PathBuf;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{MediascopeError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Per-entity reporter configuration
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Coordinator batching and host endpoints
    #[serde(default)]
    pub relay: RelayConfig,

    /// Identity reported by every page
    #[serde(default)]
    pub extension: ExtensionConfig,

    /// Settings for `mediascope host serve`
    #[serde(default)]
    pub host: HostModeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverConfig {
    /// Debounce window for entity change-sets, in milliseconds
    #[serde(default = "default_flush_delay_ms")]
    pub flush_delay_ms: u64,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            flush_delay_ms: default_flush_delay_ms(),
        }
    }
}

impl ObserverConfig {
    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Debounce window for the outbound batch, in milliseconds
    #[serde(default = "default_flush_delay_ms")]
    pub flush_delay_ms: u64,

    /// Native messaging hosts that receive every batch
    #[serde(default = "default_hosts")]
    pub hosts: Vec<HostConfig>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            flush_delay_ms: default_flush_delay_ms(),
            hosts: default_hosts(),
        }
    }
}

impl RelayConfig {
    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionConfig {
    /// Extension id reported as `extensionId`
    #[serde(default = "default_extension_id")]
    pub id: String,

    /// Extension version reported as `extensionVersion`
    #[serde(default = "default_extension_version")]
    pub version: String,

    /// Browser name reported as `browser`
    #[serde(default = "default_browser")]
    pub browser: String,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            id: default_extension_id(),
            version: default_extension_version(),
            browser: default_browser(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostModeConfig {
    /// Session id replied as `hostId`; a random one is used when unset
    pub session_id: Option<String>,
}

fn default_flush_delay_ms() -> u64 {
    20
}

fn default_hosts() -> Vec<HostConfig> {
    vec![
        HostConfig::named("com.soundresearch.contentclassifier"),
        HostConfig::named("com.soundresearch.contentclassifier.usb"),
    ]
}

fn default_extension_id() -> String {
    "fkhppjmkbifibialnglmjegmgckmkdco".to_string()
}

fn default_extension_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_browser() -> String {
    "chrome".to_string()
}

impl Config {
    /// Load configuration from all sources (file, env, defaults)
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration using an explicit file path
    pub fn load_from(config_path: &std::path::Path) -> Result<Self> {
        let config: Config = Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Config::default()))
            // Merge config file if exists
            .merge(Toml::file(config_path))
            // Merge environment variables (MEDIASCOPE_RELAY__FLUSH_DELAY_MS, ...)
            .merge(Env::prefixed("MEDIASCOPE_").split("__"))
            .extract()
            .map_err(|e| MediascopeError::ConfigError(e.to_string()))?;

        Ok(config)
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mediascope")
            .join("config.toml")
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| MediascopeError::ConfigError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_twenty_ms_windows() {
        let config = Config::default();

        assert_eq!(config.observer.flush_delay(), Duration::from_millis(20));
        assert_eq!(config.relay.flush_delay(), Duration::from_millis(20));
        assert_eq!(config.extension.browser, "chrome");
    }

    #[test]
    fn default_config_targets_both_classifier_hosts() {
        let config = Config::default();
        let names: Vec<&str> = config.relay.hosts.iter().map(|h| h.name.as_str()).collect();

        assert_eq!(
            names,
            vec![
                "com.soundresearch.contentclassifier",
                "com.soundresearch.contentclassifier.usb"
            ]
        );
    }

    #[test]
    #[serial_test::serial]
    fn load_from_merges_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[observer]
flush_delay_ms = 50

[[relay.hosts]]
name = "org.example.sink"
command = "/usr/local/bin/sink"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.observer.flush_delay_ms, 50);
        assert_eq!(config.relay.flush_delay_ms, 20);
        assert_eq!(config.relay.hosts.len(), 1);
        assert_eq!(config.relay.hosts[0].name, "org.example.sink");
        assert_eq!(
            config.relay.hosts[0].command.as_deref(),
            Some("/usr/local/bin/sink")
        );
    }

    #[test]
    #[serial_test::serial]
    fn load_from_reads_nested_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        std::env::set_var("MEDIASCOPE_RELAY__FLUSH_DELAY_MS", "75");
        let config = Config::load_from(&path);
        std::env::remove_var("MEDIASCOPE_RELAY__FLUSH_DELAY_MS");

        assert_eq!(config.unwrap().relay.flush_delay_ms, 75);
    }
}
