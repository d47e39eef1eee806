//! Inbound push payloads and the notification display options built from them.

use crate::config::DeliveryConfig;
use crate::error::{PushError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Button shown on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Wire format accepted from the push transport.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub badge: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub actions: Option<Vec<NotificationAction>>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl PushPayload {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| PushError::MalformedPayload(e.to_string()))
    }
}

/// Display options handed to `showNotification`.
///
/// Field names serialize to the platform's `NotificationOptions` dictionary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub image: String,
    pub data: Value,
    pub tag: String,
    pub require_interaction: bool,
    pub actions: Vec<NotificationAction>,
    pub silent: bool,
    pub renotify: bool,
    pub timestamp: u64,
}

impl NotificationOptions {
    /// Apply defaults for everything the payload left out.
    ///
    /// Notifications always wait for the user and always re-alert, so two
    /// pushes sharing a tag are never merged silently.
    pub fn from_payload(payload: &PushPayload, config: &DeliveryConfig, timestamp: u64) -> Self {
        Self {
            body: payload.body.clone(),
            icon: or_default(&payload.icon, &config.default_asset),
            badge: or_default(&payload.badge, &config.default_asset),
            image: or_default(&payload.image, &config.default_asset),
            data: merge_data(payload.data.as_ref(), &config.default_url),
            tag: or_default(&payload.tag, &config.default_tag),
            require_interaction: true,
            actions: payload.actions.clone().unwrap_or_default(),
            silent: false,
            renotify: true,
            timestamp,
        }
    }

    /// URL injected as `defaultUrl`, if still present.
    pub fn default_url(&self) -> Option<&str> {
        self.data.get("defaultUrl").and_then(Value::as_str)
    }
}

fn or_default(value: &Option<String>, fallback: &str) -> String {
    match value.as_deref() {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => fallback.to_string(),
    }
}

/// Copy the payload's data object and inject `defaultUrl` (which wins).
fn merge_data(data: Option<&Value>, default_url: &str) -> Value {
    let mut map = match data {
        Some(Value::Object(map)) => map.clone(),
        None | Some(Value::Null) => Map::new(),
        Some(other) => {
            tracing::debug!("Ignoring non-object push data: {}", other);
            Map::new()
        }
    };
    map.insert(
        "defaultUrl".to_string(),
        Value::String(default_url.to_string()),
    );
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(raw: &str) -> PushPayload {
        PushPayload::decode(raw.as_bytes()).unwrap()
    }

    #[test]
    fn test_minimal_payload_gets_defaults() {
        let payload = decode(r#"{"title":"Hi","body":"there"}"#);
        let options = NotificationOptions::from_payload(&payload, &DeliveryConfig::default(), 42);

        assert_eq!(options.body, "there");
        assert_eq!(options.icon, "/images/logo.png");
        assert_eq!(options.badge, "/images/logo.png");
        assert_eq!(options.image, "/images/logo.png");
        assert_eq!(options.tag, "default");
        assert!(options.actions.is_empty());
        assert!(options.require_interaction);
        assert!(options.renotify);
        assert!(!options.silent);
        assert_eq!(options.timestamp, 42);
        assert_eq!(options.data, serde_json::json!({"defaultUrl": "/"}));
    }

    #[test]
    fn test_explicit_fields_are_kept() {
        let payload = decode(
            r#"{"title":"T","body":"B","icon":"/i.png","badge":"/b.png","image":"/m.png",
                "tag":"chat","actions":[{"action":"open","title":"Open","icon":"/o.png"},
                {"action":"later","title":"Later"}]}"#,
        );
        let options = NotificationOptions::from_payload(&payload, &DeliveryConfig::default(), 0);

        assert_eq!(options.icon, "/i.png");
        assert_eq!(options.badge, "/b.png");
        assert_eq!(options.image, "/m.png");
        assert_eq!(options.tag, "chat");
        assert_eq!(options.actions.len(), 2);
        assert_eq!(options.actions[1].icon, None);
    }

    #[test]
    fn test_empty_strings_fall_back() {
        let payload = decode(r#"{"title":"T","body":"B","icon":"","tag":""}"#);
        let options = NotificationOptions::from_payload(&payload, &DeliveryConfig::default(), 0);
        assert_eq!(options.icon, "/images/logo.png");
        assert_eq!(options.tag, "default");
    }

    #[test]
    fn test_data_is_merged_and_default_url_wins() {
        let payload = decode(
            r#"{"title":"T","body":"B","data":{"thread":7,"defaultUrl":"/elsewhere"}}"#,
        );
        let options = NotificationOptions::from_payload(&payload, &DeliveryConfig::default(), 0);
        assert_eq!(options.data["thread"], 7);
        assert_eq!(options.default_url(), Some("/"));
    }

    #[test]
    fn test_non_object_data_is_replaced() {
        let payload = decode(r#"{"title":"T","body":"B","data":[1,2]}"#);
        let options = NotificationOptions::from_payload(&payload, &DeliveryConfig::default(), 0);
        assert_eq!(options.data, serde_json::json!({"defaultUrl": "/"}));
    }

    #[test]
    fn test_custom_config_defaults() {
        let config = DeliveryConfig {
            default_asset: "/static/bell.svg".to_string(),
            default_tag: "alerts".to_string(),
            default_url: "/inbox".to_string(),
            ..Default::default()
        };
        let payload = decode(r#"{"title":"T","body":"B"}"#);
        let options = NotificationOptions::from_payload(&payload, &config, 0);
        assert_eq!(options.badge, "/static/bell.svg");
        assert_eq!(options.tag, "alerts");
        assert_eq!(options.default_url(), Some("/inbox"));
    }

    #[test]
    fn test_malformed_payloads_rejected() {
        assert!(matches!(
            PushPayload::decode(b"not json"),
            Err(PushError::MalformedPayload(_))
        ));
        // title is required
        assert!(PushPayload::decode(br#"{"body":"B"}"#).is_err());
    }

    #[test]
    fn test_options_serialize_as_platform_dictionary() {
        let payload = decode(r#"{"title":"T","body":"B"}"#);
        let options = NotificationOptions::from_payload(&payload, &DeliveryConfig::default(), 5);
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["requireInteraction"], true);
        assert_eq!(json["renotify"], true);
        assert_eq!(json["timestamp"], 5);
    }
}
