//! Platform seams.
//!
//! The browser bindings in `nudge-wasm` implement these over `web-sys`; the
//! in-memory [`crate::sim`] implements them for tests and the CLI. Browser
//! handles are not `Send`, so the async traits are `?Send`.

use crate::error::Result;
use crate::payload::NotificationOptions;
use crate::protocol::{ClientMessage, DisplayMode, HostEvent};
use crate::subscription::{
    PermissionState, SubscribeOptions, SubscriptionDescriptor, SubscriptionState,
};
use async_trait::async_trait;

// ============================================================================
// PAGE CONTEXT
// ============================================================================

/// Handle to the origin's background worker registration.
#[async_trait(?Send)]
pub trait WorkerRegistration {
    /// Current subscription for this registration, if any.
    async fn get_subscription(&self) -> Result<Option<SubscriptionDescriptor>>;

    /// Create a subscription. The platform returns the existing one when the
    /// registration is already subscribed with the same key.
    async fn subscribe(&self, options: &SubscribeOptions) -> Result<SubscriptionDescriptor>;

    /// Revoke the live subscription if its endpoint is `endpoint`.
    ///
    /// Returns `Ok(false)` when there was nothing to revoke, including when a
    /// different subscription has replaced it in the meantime.
    async fn unsubscribe(&self, endpoint: &str) -> Result<bool>;
}

/// Page-context capabilities the controller depends on.
#[async_trait(?Send)]
pub trait PagePlatform {
    type Registration: WorkerRegistration + Clone;

    /// Whether the platform offers background workers at all.
    fn supports_workers(&self) -> bool;

    /// Register the worker script. Idempotent per origin.
    async fn register_worker(&self, script_url: &str) -> Result<Self::Registration>;

    /// Resolve once the registration has an active worker.
    async fn wait_until_active(&self, registration: &Self::Registration) -> Result<()>;

    async fn request_permission(&self) -> Result<PermissionState>;
}

/// Host application and presentation layer, as seen from the controller.
#[cfg_attr(test, mockall::automock)]
pub trait HostBridge {
    /// Deliver a controller event to the host application.
    fn emit(&self, event: HostEvent);

    /// Tell the presentation layer which state to show.
    fn render_status(&self, state: SubscriptionState);

    fn display_mode(&self) -> DisplayMode;
}

// ============================================================================
// WORKER CONTEXT
// ============================================================================

/// Notification still shown (not dismissed) by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveNotification {
    pub title: String,
    pub tag: String,
}

/// An open page of the origin, as enumerated by the worker.
#[async_trait(?Send)]
pub trait PageClient {
    fn id(&self) -> String;

    fn url(&self) -> String;

    /// Post without waiting for acknowledgement.
    fn post_message(&self, message: &ClientMessage) -> Result<()>;

    /// Bring the page to the foreground. `Ok(false)` if it cannot be focused.
    async fn focus(&self) -> Result<bool>;
}

/// Worker global scope: notifications, clients and windows.
#[async_trait(?Send)]
pub trait WorkerScope {
    type Client: PageClient;

    async fn show_notification(&self, title: &str, options: &NotificationOptions) -> Result<()>;

    async fn get_notifications(&self) -> Result<Vec<ActiveNotification>>;

    /// All currently open pages of the origin.
    async fn match_all(&self) -> Result<Vec<Self::Client>>;

    async fn open_window(&self, url: &str) -> Result<()>;
}

/// Notification the user clicked.
pub trait DisplayedNotification {
    fn close(&self);

    /// The `data` bag the notification was shown with.
    fn data(&self) -> Option<serde_json::Value>;
}
