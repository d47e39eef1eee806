//! Subscription descriptors and derived state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Key material the backend needs to encrypt pushes for this subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    /// Client ECDH public key, base64url.
    pub p256dh: String,
    /// Client auth secret, base64url.
    pub auth: String,
}

/// Credential issued by the platform push manager.
///
/// Serializes to the same shape as `PushSubscription.toJSON()`, which is what
/// the host forwards to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDescriptor {
    pub endpoint: String,
    #[serde(default)]
    pub expiration_time: Option<u64>,
    pub keys: SubscriptionKeys,
}

impl SubscriptionDescriptor {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "endpoint": self.endpoint,
            "expirationTime": self.expiration_time,
            "keys": {
                "p256dh": self.keys.p256dh,
                "auth": self.keys.auth,
            },
        })
    }
}

/// Derived from the platform on demand; never cached as authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionState {
    Subscribed,
    Unsubscribed,
}

impl SubscriptionState {
    pub fn from_presence(present: bool) -> Self {
        if present {
            Self::Subscribed
        } else {
            Self::Unsubscribed
        }
    }

    pub fn is_subscribed(self) -> bool {
        self == Self::Subscribed
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscribed => write!(f, "subscribed"),
            Self::Unsubscribed => write!(f, "unsubscribed"),
        }
    }
}

/// Result of a notification permission prompt.
///
/// `Default` is what the platform reports when the user dismisses the prompt
/// without choosing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    Default,
}

impl PermissionState {
    pub fn is_granted(self) -> bool {
        self == Self::Granted
    }
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Granted => write!(f, "granted"),
            Self::Denied => write!(f, "denied"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl FromStr for PermissionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "granted" => Ok(Self::Granted),
            "denied" => Ok(Self::Denied),
            "default" => Ok(Self::Default),
            other => Err(format!("unknown permission state: {}", other)),
        }
    }
}

/// Options passed to the push manager when creating a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Browsers only allow subscriptions whose pushes are always shown.
    pub user_visible_only: bool,
    pub application_server_key: Vec<u8>,
}

impl SubscribeOptions {
    pub fn visible(application_server_key: Vec<u8>) -> Self {
        Self {
            user_visible_only: true,
            application_server_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> SubscriptionDescriptor {
        SubscriptionDescriptor {
            endpoint: "https://push.example.net/wpush/abc".to_string(),
            expiration_time: None,
            keys: SubscriptionKeys {
                p256dh: "BPk".to_string(),
                auth: "c2VjcmV0".to_string(),
            },
        }
    }

    #[test]
    fn test_descriptor_json_matches_platform_shape() {
        let json = descriptor().to_json();
        assert_eq!(json["endpoint"], "https://push.example.net/wpush/abc");
        assert!(json["expirationTime"].is_null());
        assert_eq!(json["keys"]["auth"], "c2VjcmV0");
    }

    #[test]
    fn test_descriptor_parses_platform_json() {
        let raw = r#"{"endpoint":"https://e/1","expirationTime":null,"keys":{"p256dh":"a","auth":"b"}}"#;
        let parsed: SubscriptionDescriptor = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.endpoint, "https://e/1");
        assert_eq!(parsed.keys.p256dh, "a");
    }

    #[test]
    fn test_descriptor_json_round_trips_through_serde() {
        let json = descriptor().to_json();
        let back: SubscriptionDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, descriptor());
    }

    #[test]
    fn test_permission_parse() {
        assert_eq!("granted".parse::<PermissionState>(), Ok(PermissionState::Granted));
        assert_eq!("default".parse::<PermissionState>(), Ok(PermissionState::Default));
        assert!("maybe".parse::<PermissionState>().is_err());
    }

    #[test]
    fn test_state_from_presence() {
        assert_eq!(SubscriptionState::from_presence(true), SubscriptionState::Subscribed);
        assert!(!SubscriptionState::from_presence(false).is_subscribed());
        assert_eq!(SubscriptionState::Subscribed.to_string(), "subscribed");
    }
}
