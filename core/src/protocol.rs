//! Messages crossing context boundaries.
//!
//! [`ClientMessage`] goes from the worker to every open page; [`HostEvent`]
//! goes from a page controller to its host application.

use crate::error::{PushError, Result};
use crate::platform::{PageClient, WorkerScope};
use serde::{Deserialize, Serialize};
use std::fmt;
use web_time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, as `Date.now()` reports it.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ============================================================================
// WORKER -> PAGE
// ============================================================================

/// Fire-and-forget broadcast from the delivery handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    NotificationCreated {
        title: String,
        body: String,
        timestamp: u64,
    },
    NotificationStatus {
        count: usize,
        message: String,
    },
    NotificationError {
        error: String,
    },
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotificationCreated { .. } => "NOTIFICATION_CREATED",
            Self::NotificationStatus { .. } => "NOTIFICATION_STATUS",
            Self::NotificationError { .. } => "NOTIFICATION_ERROR",
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parse a message received by a page. Unknown shapes are an error.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| PushError::Encoding(e.to_string()))
    }
}

/// Post `message` to every open page of the origin.
///
/// Returns how many pages accepted it. A page that rejects the post is logged
/// and skipped; the call only fails when enumeration fails or every page
/// rejects.
pub async fn broadcast<S: WorkerScope>(scope: &S, message: &ClientMessage) -> Result<usize> {
    let clients = scope.match_all().await?;
    let mut delivered = 0;
    let mut last_error = None;
    for client in &clients {
        match client.post_message(message) {
            Ok(()) => delivered += 1,
            Err(e) => {
                tracing::warn!("Could not post {} to {}: {}", message.kind(), client.id(), e);
                last_error = Some(e);
            }
        }
    }
    if delivered == 0 {
        if let Some(e) = last_error {
            return Err(e);
        }
    }
    tracing::debug!(
        "Broadcast {} to {} of {} page(s)",
        message.kind(),
        delivered,
        clients.len()
    );
    Ok(delivered)
}

// ============================================================================
// PAGE -> HOST
// ============================================================================

/// Events the controller pushes to the host application.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// New subscription, serialized for the backend
    Subscribe { subscription: serde_json::Value },
    /// Locally revoked subscription
    Unsubscribe { endpoint: String },
    /// Page runs as an installed application
    IsPwa(bool),
}

impl HostEvent {
    /// Event name the host listens for.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::IsPwa(_) => "is-pwa",
        }
    }

    /// Event payload as the host receives it.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            Self::Subscribe { subscription } => {
                serde_json::json!({ "subscription": subscription })
            }
            Self::Unsubscribe { endpoint } => serde_json::json!({ "endpoint": endpoint }),
            Self::IsPwa(flag) => serde_json::Value::Bool(*flag),
        }
    }
}

/// How the page is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayMode {
    Browser,
    Standalone,
    MinimalUi,
    Fullscreen,
    /// Safari home-screen app (`navigator.standalone`)
    IosStandalone,
}

impl DisplayMode {
    /// Anything but a plain browser tab counts as installed.
    pub fn is_installed(self) -> bool {
        self != Self::Browser
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Browser => write!(f, "browser"),
            Self::Standalone => write!(f, "standalone"),
            Self::MinimalUi => write!(f, "minimal-ui"),
            Self::Fullscreen => write!(f, "fullscreen"),
            Self::IosStandalone => write!(f, "ios-standalone"),
        }
    }
}

/// Path component of an absolute or origin-relative URL.
pub(crate) fn url_path(url: &str) -> &str {
    match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            match rest.find('/') {
                Some(slash) => &rest[slash..],
                None => "/",
            }
        }
        None => url,
    }
}
