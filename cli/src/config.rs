// Configuration management for the nudge CLI
//
// Stored as JSON in:
// - macOS: ~/Library/Application Support/nudge/config.json
// - Linux: ~/.config/nudge/config.json
// - Windows: %APPDATA%\nudge\config.json

use anyhow::{Context, Result};
use nudge_core::{ControllerConfig, DeliveryConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Page-side settings used by `simulate`
    pub controller: ControllerConfig,

    /// Worker-side settings used by `render` and `simulate`
    pub delivery: DeliveryConfig,
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("nudge");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Set a config value (in memory; callers save)
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "vapid_public_key" => {
                if !value.is_empty() {
                    nudge_core::VapidPublicKey::from_base64url(value)
                        .context("Invalid VAPID public key")?;
                }
                self.controller.vapid_public_key = value.to_string();
            }
            "worker_script_url" => self.controller.worker_script_url = value.to_string(),
            "default_asset" => self.delivery.default_asset = value.to_string(),
            "default_tag" => self.delivery.default_tag = value.to_string(),
            "default_url" => self.delivery.default_url = value.to_string(),
            "status_message" => self.delivery.status_message = value.to_string(),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.list()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            (
                "vapid_public_key".to_string(),
                self.controller.vapid_public_key.clone(),
            ),
            (
                "worker_script_url".to_string(),
                self.controller.worker_script_url.clone(),
            ),
            ("default_asset".to_string(), self.delivery.default_asset.clone()),
            ("default_tag".to_string(), self.delivery.default_tag.clone()),
            ("default_url".to_string(), self.delivery.default_url.clone()),
            ("status_message".to_string(), self.delivery.status_message.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.get("default_tag").as_deref(), Some("default"));
        assert_eq!(
            config.get("worker_script_url").as_deref(),
            Some("/pwa-service-worker.js")
        );
        assert_eq!(config.get("nope"), None);
    }

    #[test]
    fn test_load_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn test_set_persists_through_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::load_from(&path).unwrap();
        config.set("default_url", "/inbox").unwrap();
        config.set("status_message", "New alert").unwrap();
        config.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.delivery.default_url, "/inbox");
        assert_eq!(reloaded.get("status_message").as_deref(), Some("New alert"));
    }

    #[test]
    fn test_set_rejects_unknown_key_and_bad_vapid() {
        let mut config = Config::default();
        assert!(config.set("listen_port", "1").is_err());
        assert!(config.set("vapid_public_key", "***").is_err());
        assert!(config.controller.vapid_public_key.is_empty());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"delivery":{"default_tag":"ops"}}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.delivery.default_tag, "ops");
        assert_eq!(config.delivery.default_url, "/");
        assert_eq!(config.controller, ControllerConfig::default());
    }
}
