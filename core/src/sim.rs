//! In-memory browser origin.
//!
//! Implements every platform seam over shared state so the controller and
//! delivery handler can be exercised without a browser: one [`SimOrigin`]
//! holds the push service, the worker registration, the notification tray and
//! the set of open pages. Failures can be injected per operation.

use crate::error::{PushError, Result};
use crate::payload::NotificationOptions;
use crate::platform::{
    ActiveNotification, DisplayedNotification, HostBridge, PageClient, PagePlatform,
    WorkerRegistration, WorkerScope,
};
use crate::protocol::{ClientMessage, DisplayMode, HostEvent};
use crate::subscription::{
    PermissionState, SubscribeOptions, SubscriptionDescriptor, SubscriptionKeys,
    SubscriptionState,
};
use crate::vapid::encode_base64url;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A notification as the platform displayed it.
#[derive(Debug, Clone, PartialEq)]
pub struct ShownNotification {
    pub title: String,
    pub options: NotificationOptions,
}

#[derive(Debug, Default)]
struct Failures {
    registration: Option<String>,
    subscribe: Option<String>,
    get_subscription: Option<String>,
    show: Option<String>,
    get_notifications: Option<String>,
    clients: bool,
}

#[derive(Debug)]
struct PageEntry {
    id: String,
    url: String,
    inbox: Vec<ClientMessage>,
    open: bool,
    rejects_messages: bool,
}

#[derive(Debug)]
struct OriginState {
    worker_support: bool,
    registered_script: Option<String>,
    permission: PermissionState,
    permission_prompts: u32,
    subscription: Option<SubscriptionDescriptor>,
    application_server_key: Option<Vec<u8>>,
    subscriptions_created: u64,
    active: Vec<ShownNotification>,
    pages: Vec<PageEntry>,
    opened_windows: Vec<String>,
    failures: Failures,
}

impl Default for OriginState {
    fn default() -> Self {
        Self {
            worker_support: true,
            registered_script: None,
            permission: PermissionState::Granted,
            permission_prompts: 0,
            subscription: None,
            application_server_key: None,
            subscriptions_created: 0,
            active: Vec::new(),
            pages: Vec::new(),
            opened_windows: Vec::new(),
            failures: Failures::default(),
        }
    }
}

// ============================================================================
// ORIGIN
// ============================================================================

/// Shared state of one origin. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct SimOrigin {
    inner: Arc<Mutex<OriginState>>,
}

impl SimOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a page at `url`; it becomes visible to the worker's `match_all`.
    pub fn open_page(&self, url: &str) -> SimPage {
        let mut state = self.inner.lock();
        let id = format!("page-{}", state.pages.len() + 1);
        state.pages.push(PageEntry {
            id: id.clone(),
            url: url.to_string(),
            inbox: Vec::new(),
            open: true,
            rejects_messages: false,
        });
        SimPage {
            origin: self.clone(),
            id,
        }
    }

    pub fn worker_scope(&self) -> SimWorkerScope {
        SimWorkerScope {
            origin: self.clone(),
        }
    }

    pub fn set_worker_support(&self, supported: bool) {
        self.inner.lock().worker_support = supported;
    }

    /// Answer given to every subsequent permission prompt.
    pub fn set_permission(&self, permission: PermissionState) {
        self.inner.lock().permission = permission;
    }

    pub fn fail_registration(&self, reason: &str) {
        self.inner.lock().failures.registration = Some(reason.to_string());
    }

    pub fn fail_next_subscribe(&self, reason: &str) {
        self.inner.lock().failures.subscribe = Some(reason.to_string());
    }

    pub fn fail_next_get_subscription(&self, reason: &str) {
        self.inner.lock().failures.get_subscription = Some(reason.to_string());
    }

    pub fn fail_next_show(&self, reason: &str) {
        self.inner.lock().failures.show = Some(reason.to_string());
    }

    pub fn fail_next_get_notifications(&self, reason: &str) {
        self.inner.lock().failures.get_notifications = Some(reason.to_string());
    }

    /// While set, every client enumeration fails.
    pub fn fail_client_enumeration(&self, fail: bool) {
        self.inner.lock().failures.clients = fail;
    }

    /// Drop the subscription behind the pages' backs (expiry, browser UI).
    pub fn revoke_externally(&self) {
        self.inner.lock().subscription = None;
    }

    pub fn subscription(&self) -> Option<SubscriptionDescriptor> {
        self.inner.lock().subscription.clone()
    }

    pub fn registered_script(&self) -> Option<String> {
        self.inner.lock().registered_script.clone()
    }

    pub fn permission_prompts(&self) -> u32 {
        self.inner.lock().permission_prompts
    }

    pub fn last_application_server_key(&self) -> Option<Vec<u8>> {
        self.inner.lock().application_server_key.clone()
    }

    /// Notifications currently in the tray.
    pub fn shown_notifications(&self) -> Vec<ShownNotification> {
        self.inner.lock().active.clone()
    }

    /// User dismissed every notification with `tag`.
    pub fn dismiss(&self, tag: &str) {
        self.inner.lock().active.retain(|n| n.options.tag != tag);
    }

    pub fn opened_windows(&self) -> Vec<String> {
        self.inner.lock().opened_windows.clone()
    }

    fn inbox_of(&self, page_id: &str) -> Vec<ClientMessage> {
        self.inner
            .lock()
            .pages
            .iter()
            .find(|p| p.id == page_id)
            .map(|p| p.inbox.clone())
            .unwrap_or_default()
    }
}

// ============================================================================
// PAGE CONTEXT
// ============================================================================

/// One open page. Clones refer to the same page.
#[derive(Debug, Clone)]
pub struct SimPage {
    origin: SimOrigin,
    id: String,
}

impl SimPage {
    pub fn id(&self) -> String {
        self.id.clone()
    }

    /// Messages the worker has posted to this page, oldest first.
    pub fn inbox(&self) -> Vec<ClientMessage> {
        self.origin.inbox_of(&self.id)
    }

    /// Close the page; the worker no longer sees it.
    pub fn close(&self) {
        let mut state = self.origin.inner.lock();
        if let Some(page) = state.pages.iter_mut().find(|p| p.id == self.id) {
            page.open = false;
        }
    }

    /// While set, the page stays visible to the worker but every message
    /// posted to it fails (a stale client).
    pub fn reject_messages(&self, reject: bool) {
        let mut state = self.origin.inner.lock();
        if let Some(page) = state.pages.iter_mut().find(|p| p.id == self.id) {
            page.rejects_messages = reject;
        }
    }
}

#[async_trait(?Send)]
impl PagePlatform for SimPage {
    type Registration = SimRegistration;

    fn supports_workers(&self) -> bool {
        self.origin.inner.lock().worker_support
    }

    async fn register_worker(&self, script_url: &str) -> Result<SimRegistration> {
        let mut state = self.origin.inner.lock();
        if let Some(reason) = &state.failures.registration {
            return Err(PushError::Registration(reason.clone()));
        }
        state.registered_script = Some(script_url.to_string());
        Ok(SimRegistration {
            origin: self.origin.clone(),
        })
    }

    async fn wait_until_active(&self, _registration: &SimRegistration) -> Result<()> {
        Ok(())
    }

    async fn request_permission(&self) -> Result<PermissionState> {
        let mut state = self.origin.inner.lock();
        state.permission_prompts += 1;
        Ok(state.permission)
    }
}

/// The origin's single worker registration.
#[derive(Debug, Clone)]
pub struct SimRegistration {
    origin: SimOrigin,
}

#[async_trait(?Send)]
impl WorkerRegistration for SimRegistration {
    async fn get_subscription(&self) -> Result<Option<SubscriptionDescriptor>> {
        let mut state = self.origin.inner.lock();
        if let Some(reason) = state.failures.get_subscription.take() {
            return Err(PushError::Subscription(reason));
        }
        Ok(state.subscription.clone())
    }

    async fn subscribe(&self, options: &SubscribeOptions) -> Result<SubscriptionDescriptor> {
        let mut state = self.origin.inner.lock();
        if let Some(reason) = state.failures.subscribe.take() {
            return Err(PushError::Subscription(reason));
        }
        if !options.user_visible_only {
            return Err(PushError::Subscription(
                "userVisibleOnly is required".to_string(),
            ));
        }
        if let Some(existing) = &state.subscription {
            if state.application_server_key.as_deref() == Some(&options.application_server_key[..]) {
                return Ok(existing.clone());
            }
            return Err(PushError::Subscription(
                "subscribed with a different applicationServerKey".to_string(),
            ));
        }

        state.subscriptions_created += 1;
        let n = state.subscriptions_created;
        let mut p256dh = vec![0x04u8; 65];
        p256dh[1..9].copy_from_slice(&n.to_be_bytes());
        let descriptor = SubscriptionDescriptor {
            endpoint: format!("https://push.example.net/wpush/v2/sim-{:04}", n),
            expiration_time: None,
            keys: SubscriptionKeys {
                p256dh: encode_base64url(&p256dh),
                auth: encode_base64url(&n.to_le_bytes()),
            },
        };
        state.application_server_key = Some(options.application_server_key.clone());
        state.subscription = Some(descriptor.clone());
        Ok(descriptor)
    }

    async fn unsubscribe(&self, endpoint: &str) -> Result<bool> {
        let mut state = self.origin.inner.lock();
        match &state.subscription {
            Some(current) if current.endpoint == endpoint => {
                state.subscription = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Host bridge that records what the controller told it.
#[derive(Debug)]
pub struct SimHost {
    display_mode: DisplayMode,
    events: Mutex<Vec<HostEvent>>,
    statuses: Mutex<Vec<SubscriptionState>>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::with_display_mode(DisplayMode::Browser)
    }
}

impl SimHost {
    pub fn with_display_mode(display_mode: DisplayMode) -> Self {
        Self {
            display_mode,
            events: Mutex::new(Vec::new()),
            statuses: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().clone()
    }

    pub fn statuses(&self) -> Vec<SubscriptionState> {
        self.statuses.lock().clone()
    }
}

impl HostBridge for SimHost {
    fn emit(&self, event: HostEvent) {
        self.events.lock().push(event);
    }

    fn render_status(&self, state: SubscriptionState) {
        self.statuses.lock().push(state);
    }

    fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }
}

// ============================================================================
// WORKER CONTEXT
// ============================================================================

#[derive(Debug, Clone)]
pub struct SimWorkerScope {
    origin: SimOrigin,
}

#[derive(Debug, Clone)]
pub struct SimClient {
    origin: SimOrigin,
    id: String,
    url: String,
}

#[async_trait(?Send)]
impl PageClient for SimClient {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn url(&self) -> String {
        self.url.clone()
    }

    fn post_message(&self, message: &ClientMessage) -> Result<()> {
        let mut state = self.origin.inner.lock();
        match state.pages.iter_mut().find(|p| p.id == self.id && p.open) {
            Some(page) if page.rejects_messages => Err(PushError::Clients(format!(
                "client {} rejected the message",
                self.id
            ))),
            Some(page) => {
                page.inbox.push(message.clone());
                Ok(())
            }
            None => Err(PushError::Clients(format!("client {} is gone", self.id))),
        }
    }

    async fn focus(&self) -> Result<bool> {
        let state = self.origin.inner.lock();
        Ok(state.pages.iter().any(|p| p.id == self.id && p.open))
    }
}

#[async_trait(?Send)]
impl WorkerScope for SimWorkerScope {
    type Client = SimClient;

    async fn show_notification(&self, title: &str, options: &NotificationOptions) -> Result<()> {
        let mut state = self.origin.inner.lock();
        if let Some(reason) = state.failures.show.take() {
            return Err(PushError::Notification(reason));
        }
        // Same tag replaces the notification in the tray.
        state.active.retain(|n| n.options.tag != options.tag);
        state.active.push(ShownNotification {
            title: title.to_string(),
            options: options.clone(),
        });
        Ok(())
    }

    async fn get_notifications(&self) -> Result<Vec<ActiveNotification>> {
        let mut state = self.origin.inner.lock();
        if let Some(reason) = state.failures.get_notifications.take() {
            return Err(PushError::Notification(reason));
        }
        Ok(state
            .active
            .iter()
            .map(|n| ActiveNotification {
                title: n.title.clone(),
                tag: n.options.tag.clone(),
            })
            .collect())
    }

    async fn match_all(&self) -> Result<Vec<SimClient>> {
        let state = self.origin.inner.lock();
        if state.failures.clients {
            return Err(PushError::Clients("clients.matchAll rejected".to_string()));
        }
        Ok(state
            .pages
            .iter()
            .filter(|p| p.open)
            .map(|p| SimClient {
                origin: self.origin.clone(),
                id: p.id.clone(),
                url: p.url.clone(),
            })
            .collect())
    }

    async fn open_window(&self, url: &str) -> Result<()> {
        self.origin.inner.lock().opened_windows.push(url.to_string());
        Ok(())
    }
}

/// Notification handed to the click handler.
#[derive(Debug, Default)]
pub struct SimNotification {
    data: Option<serde_json::Value>,
    closed: AtomicBool,
}

impl SimNotification {
    pub fn new(data: Option<serde_json::Value>) -> Self {
        Self {
            data,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl DisplayedNotification for SimNotification {
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn data(&self) -> Option<serde_json::Value> {
        self.data.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscription_is_single_per_origin() {
        let origin = SimOrigin::new();
        let registration = origin
            .open_page("https://app.example.com/")
            .register_worker("/sw.js")
            .await
            .unwrap();
        let options = SubscribeOptions::visible(vec![4; 65]);

        let first = registration.subscribe(&options).await.unwrap();
        let again = registration.subscribe(&options).await.unwrap();
        assert_eq!(first, again);

        let other_key = SubscribeOptions::visible(vec![5; 65]);
        assert!(registration.subscribe(&other_key).await.is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_checks_endpoint() {
        let origin = SimOrigin::new();
        let registration = origin
            .open_page("https://app.example.com/")
            .register_worker("/sw.js")
            .await
            .unwrap();
        let sub = registration
            .subscribe(&SubscribeOptions::visible(vec![4; 65]))
            .await
            .unwrap();

        assert!(!registration.unsubscribe("https://elsewhere").await.unwrap());
        assert!(registration.unsubscribe(&sub.endpoint).await.unwrap());
        assert!(origin.subscription().is_none());
    }

    #[tokio::test]
    async fn test_closed_pages_are_not_enumerated() {
        let origin = SimOrigin::new();
        let page = origin.open_page("https://app.example.com/");
        origin.open_page("https://app.example.com/other");
        page.close();

        let clients = origin.worker_scope().match_all().await.unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].url(), "https://app.example.com/other");
    }

    #[tokio::test]
    async fn test_same_tag_replaces_in_tray() {
        let origin = SimOrigin::new();
        let scope = origin.worker_scope();
        let payload = crate::payload::PushPayload::decode(br#"{"title":"A","body":"B"}"#).unwrap();
        let options = NotificationOptions::from_payload(
            &payload,
            &crate::config::DeliveryConfig::default(),
            0,
        );

        scope.show_notification("A", &options).await.unwrap();
        scope.show_notification("A2", &options).await.unwrap();
        assert_eq!(scope.get_notifications().await.unwrap().len(), 1);

        origin.dismiss("default");
        assert!(scope.get_notifications().await.unwrap().is_empty());
    }
}
