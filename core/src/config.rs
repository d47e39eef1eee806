//! Configuration for the page controller and the worker delivery handler.

use serde::{Deserialize, Serialize};

pub const DEFAULT_WORKER_SCRIPT: &str = "/pwa-service-worker.js";
pub const DEFAULT_ASSET: &str = "/images/logo.png";
pub const DEFAULT_TAG: &str = "default";
pub const DEFAULT_URL: &str = "/";
pub const DEFAULT_STATUS_MESSAGE: &str = "Notification created!";

/// Page-side settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Script registered as the origin's background worker
    pub worker_script_url: String,
    /// Application server key as served by the host, base64url
    pub vapid_public_key: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            worker_script_url: DEFAULT_WORKER_SCRIPT.to_string(),
            vapid_public_key: String::new(),
        }
    }
}

impl ControllerConfig {
    pub fn with_vapid_key(vapid_public_key: impl Into<String>) -> Self {
        Self {
            vapid_public_key: vapid_public_key.into(),
            ..Default::default()
        }
    }
}

/// Worker-side settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Fallback for icon, badge and image
    pub default_asset: String,
    /// Tag used when the payload has none
    pub default_tag: String,
    /// Injected into notification data as `defaultUrl`; click target
    pub default_url: String,
    /// Text carried by every NOTIFICATION_STATUS broadcast
    pub status_message: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            default_asset: DEFAULT_ASSET.to_string(),
            default_tag: DEFAULT_TAG.to_string(),
            default_url: DEFAULT_URL.to_string(),
            status_message: DEFAULT_STATUS_MESSAGE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_defaults() {
        let config = DeliveryConfig::default();
        assert_eq!(config.default_asset, "/images/logo.png");
        assert_eq!(config.default_tag, "default");
        assert_eq!(config.default_url, "/");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: DeliveryConfig =
            serde_json::from_str(r#"{"default_tag":"news"}"#).unwrap();
        assert_eq!(config.default_tag, "news");
        assert_eq!(config.status_message, DEFAULT_STATUS_MESSAGE);
    }

    #[test]
    fn test_controller_config_with_key() {
        let config = ControllerConfig::with_vapid_key("BEl6");
        assert_eq!(config.vapid_public_key, "BEl6");
        assert_eq!(config.worker_script_url, DEFAULT_WORKER_SCRIPT);
    }
}
