//! Page-side subscription controller.
//!
//! One controller per open page. It owns subscribe / unsubscribe / status
//! operations for that page and reconciles remote device removals. The
//! platform is the single source of truth for whether a subscription exists;
//! the controller only remembers what it last rendered.
//!
//! Lifecycle: `Uninitialized -> Initializing -> Ready`. From `Ready`, the
//! transient `SubscribePending` / `UnsubscribePending` states collapse back to
//! `Ready` when the operation finishes, fails or is dropped. `Unsupported` and
//! `Failed` are terminal no-op states.

use crate::config::ControllerConfig;
use crate::error::{PushError, Result};
use crate::platform::{HostBridge, PagePlatform, WorkerRegistration};
use crate::protocol::HostEvent;
use crate::subscription::{
    PermissionState, SubscribeOptions, SubscriptionDescriptor, SubscriptionState,
};
use crate::vapid::VapidPublicKey;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// STATES & OUTCOMES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
    Uninitialized,
    Initializing,
    Ready,
    SubscribePending,
    UnsubscribePending,
    /// Platform has no background worker support
    Unsupported,
    /// Worker registration failed
    Failed,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::Initializing => write!(f, "Initializing"),
            Self::Ready => write!(f, "Ready"),
            Self::SubscribePending => write!(f, "SubscribePending"),
            Self::UnsubscribePending => write!(f, "UnsubscribePending"),
            Self::Unsupported => write!(f, "Unsupported"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    Ready(SubscriptionState),
    Unsupported,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed(SubscriptionDescriptor),
    /// A subscription already existed; nothing was prompted or emitted.
    AlreadySubscribed(SubscriptionDescriptor),
    PermissionRefused(PermissionState),
    Failed(String),
    NotReady(ControllerState),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Unsubscribed { endpoint: String },
    NotSubscribed,
    Failed(String),
    NotReady(ControllerState),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// The removed endpoint was ours and has been revoked locally.
    Revoked,
    /// The removal concerned another device or session.
    Ignored,
    Failed(String),
    NotReady(ControllerState),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Subscribe(SubscribeOutcome),
    Unsubscribe(UnsubscribeOutcome),
    /// The current state could not be read; nothing was attempted.
    Failed(String),
}

/// Resets the controller to `Ready` when a pending operation ends, however it
/// ends.
struct PendingGuard<'a> {
    state: &'a RwLock<ControllerState>,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        *self.state.write() = ControllerState::Ready;
    }
}

// ============================================================================
// CONTROLLER
// ============================================================================

pub struct SubscriptionController<P: PagePlatform, H: HostBridge> {
    platform: P,
    host: H,
    config: ControllerConfig,
    state: RwLock<ControllerState>,
    registration: RwLock<Option<P::Registration>>,
    last_rendered: RwLock<Option<SubscriptionState>>,
}

impl<P: PagePlatform, H: HostBridge> SubscriptionController<P, H> {
    pub fn new(platform: P, host: H, config: ControllerConfig) -> Self {
        Self {
            platform,
            host,
            config,
            state: RwLock::new(ControllerState::Uninitialized),
            registration: RwLock::new(None),
            last_rendered: RwLock::new(None),
        }
    }

    pub fn state(&self) -> ControllerState {
        *self.state.read()
    }

    /// State most recently pushed to the presentation layer.
    pub fn last_rendered(&self) -> Option<SubscriptionState> {
        *self.last_rendered.read()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    fn registration(&self) -> Option<P::Registration> {
        self.registration.read().clone()
    }

    /// Move `Ready -> pending`. The returned guard moves back on drop.
    fn begin(&self, pending: ControllerState) -> std::result::Result<PendingGuard<'_>, ControllerState> {
        let mut state = self.state.write();
        if *state != ControllerState::Ready {
            return Err(*state);
        }
        *state = pending;
        Ok(PendingGuard { state: &self.state })
    }

    /// Register the worker, wait for activation, render the initial status.
    ///
    /// Calling it again once ready only refreshes the status.
    pub async fn initialize(&self) -> InitOutcome {
        let previous = {
            let mut state = self.state.write();
            let previous = *state;
            if previous == ControllerState::Uninitialized {
                *state = ControllerState::Initializing;
            }
            previous
        };
        match previous {
            ControllerState::Uninitialized => {}
            ControllerState::Unsupported => return InitOutcome::Unsupported,
            ControllerState::Failed => {
                return InitOutcome::Failed("worker registration failed earlier".to_string())
            }
            ControllerState::Initializing => {
                return InitOutcome::Failed("initialization already in progress".to_string())
            }
            _ => return InitOutcome::Ready(self.reconcile_or_unsubscribed().await),
        }

        if !self.platform.supports_workers() {
            tracing::info!("Service workers not supported; push notifications disabled");
            *self.state.write() = ControllerState::Unsupported;
            return InitOutcome::Unsupported;
        }

        let registration = match self.register().await {
            Ok(registration) => registration,
            Err(e) => {
                tracing::error!("Push controller init failed: {}", e);
                *self.state.write() = ControllerState::Failed;
                return InitOutcome::Failed(e.to_string());
            }
        };

        *self.registration.write() = Some(registration);
        *self.state.write() = ControllerState::Ready;
        tracing::info!("Service worker ready");

        let status = self.reconcile_or_unsubscribed().await;

        let mode = self.host.display_mode();
        if mode.is_installed() {
            tracing::debug!("Running in {} display mode", mode);
            self.host.emit(HostEvent::IsPwa(true));
        }

        InitOutcome::Ready(status)
    }

    async fn register(&self) -> Result<P::Registration> {
        let registration = self
            .platform
            .register_worker(&self.config.worker_script_url)
            .await?;
        self.platform.wait_until_active(&registration).await?;
        Ok(registration)
    }

    /// Ask the platform whether a subscription exists right now.
    ///
    /// A failed query reads as `false`; the rendered status is not touched.
    pub async fn query_is_subscribed(&self) -> bool {
        match self.current_subscription().await {
            Ok(subscription) => subscription.is_some(),
            Err(e) => {
                tracing::error!("Subscription query failed: {}", e);
                false
            }
        }
    }

    async fn current_subscription(&self) -> Result<Option<SubscriptionDescriptor>> {
        match self.registration() {
            Some(registration) => registration.get_subscription().await,
            None => Ok(None),
        }
    }

    /// Recompute the subscription state and render it.
    ///
    /// Returns `None` (and renders nothing) unless the controller is ready.
    /// When the platform cannot be queried the previous render is kept and
    /// returned.
    pub async fn refresh_status(&self) -> Option<SubscriptionState> {
        let state = self.state();
        if state != ControllerState::Ready {
            tracing::debug!("Status refresh skipped in {} state", state);
            return None;
        }
        self.reconcile().await
    }

    async fn reconcile(&self) -> Option<SubscriptionState> {
        match self.current_subscription().await {
            Ok(subscription) => {
                let status = SubscriptionState::from_presence(subscription.is_some());
                *self.last_rendered.write() = Some(status);
                self.host.render_status(status);
                Some(status)
            }
            Err(e) => {
                let kept = self.last_rendered();
                tracing::error!("Status refresh failed, keeping {:?}: {}", kept, e);
                kept
            }
        }
    }

    async fn reconcile_or_unsubscribed(&self) -> SubscriptionState {
        self.reconcile()
            .await
            .unwrap_or(SubscriptionState::Unsubscribed)
    }

    /// Prompt for permission and create a subscription.
    ///
    /// Meant to be called while unsubscribed. If a subscription already exists
    /// it is returned as `AlreadySubscribed` without prompting or emitting.
    pub async fn subscribe(&self) -> SubscribeOutcome {
        let outcome = {
            let _pending = match self.begin(ControllerState::SubscribePending) {
                Ok(guard) => guard,
                Err(state) => {
                    tracing::warn!("Subscribe ignored in {} state", state);
                    return SubscribeOutcome::NotReady(state);
                }
            };
            self.subscribe_inner().await
        };

        if let SubscribeOutcome::Failed(ref reason) = outcome {
            tracing::error!("Subscribe failed: {}", reason);
        }
        self.reconcile().await;
        outcome
    }

    async fn subscribe_inner(&self) -> SubscribeOutcome {
        let registration = match self.registration() {
            Some(registration) => registration,
            None => return SubscribeOutcome::Failed(PushError::Unsupported.to_string()),
        };

        match registration.get_subscription().await {
            Ok(Some(existing)) => {
                tracing::debug!("Already subscribed at {}", existing.endpoint);
                return SubscribeOutcome::AlreadySubscribed(existing);
            }
            Ok(None) => {}
            Err(e) => return SubscribeOutcome::Failed(e.to_string()),
        }

        tracing::debug!("Starting subscription process");
        let permission = match self.platform.request_permission().await {
            Ok(permission) => permission,
            Err(e) => return SubscribeOutcome::Failed(e.to_string()),
        };
        tracing::debug!("Permission result: {}", permission);
        if !permission.is_granted() {
            tracing::warn!("Notification permission not granted ({})", permission);
            return SubscribeOutcome::PermissionRefused(permission);
        }

        let key = match VapidPublicKey::from_base64url(&self.config.vapid_public_key) {
            Ok(key) => key,
            Err(e) => return SubscribeOutcome::Failed(e.to_string()),
        };
        if !key.looks_like_p256() {
            tracing::warn!(
                "VAPID key is {} bytes, expected an uncompressed P-256 point",
                key.as_bytes().len()
            );
        }

        let options = SubscribeOptions::visible(key.as_bytes().to_vec());
        match registration.subscribe(&options).await {
            Ok(descriptor) => {
                tracing::info!("Subscription created: {}", descriptor.endpoint);
                self.host.emit(HostEvent::Subscribe {
                    subscription: descriptor.to_json(),
                });
                SubscribeOutcome::Subscribed(descriptor)
            }
            Err(e) => SubscribeOutcome::Failed(e.to_string()),
        }
    }

    /// Revoke the current subscription, if any, and tell the host.
    pub async fn unsubscribe(&self) -> UnsubscribeOutcome {
        let outcome = {
            let _pending = match self.begin(ControllerState::UnsubscribePending) {
                Ok(guard) => guard,
                Err(state) => {
                    tracing::warn!("Unsubscribe ignored in {} state", state);
                    return UnsubscribeOutcome::NotReady(state);
                }
            };
            match self.revoke_current(None).await {
                Ok(Some(endpoint)) => {
                    self.host.emit(HostEvent::Unsubscribe {
                        endpoint: endpoint.clone(),
                    });
                    tracing::info!("Unsubscribed from push notifications");
                    UnsubscribeOutcome::Unsubscribed { endpoint }
                }
                Ok(None) => UnsubscribeOutcome::NotSubscribed,
                Err(e) => {
                    tracing::error!("Unsubscribe failed: {}", e);
                    UnsubscribeOutcome::Failed(e.to_string())
                }
            }
        };

        self.reconcile().await;
        outcome
    }

    /// Revoke the live subscription, optionally only if its endpoint matches.
    ///
    /// Returns the revoked endpoint, or `None` when nothing was revoked.
    async fn revoke_current(&self, only_endpoint: Option<&str>) -> Result<Option<String>> {
        let registration = match self.registration() {
            Some(registration) => registration,
            None => return Ok(None),
        };
        let current = match registration.get_subscription().await? {
            Some(current) => current,
            None => return Ok(None),
        };
        if let Some(expected) = only_endpoint {
            if current.endpoint != expected {
                return Ok(None);
            }
        }
        if registration.unsubscribe(&current.endpoint).await? {
            Ok(Some(current.endpoint))
        } else {
            Ok(None)
        }
    }

    /// Handle a server-side revocation of `endpoint`.
    ///
    /// The backend originated the removal, so no `unsubscribe` event is
    /// emitted back to the host.
    pub async fn on_device_removed(&self, endpoint: &str) -> RemovalOutcome {
        let outcome = {
            let _pending = match self.begin(ControllerState::UnsubscribePending) {
                Ok(guard) => guard,
                Err(state) => {
                    tracing::warn!("Device removal ignored in {} state", state);
                    return RemovalOutcome::NotReady(state);
                }
            };
            match self.revoke_current(Some(endpoint)).await {
                Ok(Some(_)) => RemovalOutcome::Revoked,
                Ok(None) => RemovalOutcome::Ignored,
                Err(e) => {
                    tracing::error!("Error handling device removal: {}", e);
                    RemovalOutcome::Failed(e.to_string())
                }
            }
        };

        match outcome {
            RemovalOutcome::Revoked => {
                tracing::info!("Device removed remotely; local subscription revoked");
                self.reconcile().await;
            }
            RemovalOutcome::Ignored => {
                tracing::debug!("Device removal for another endpoint ignored");
            }
            _ => {}
        }
        outcome
    }

    /// Subscribe control handler: flip the current state.
    pub async fn toggle(&self) -> ToggleOutcome {
        match self.current_subscription().await {
            Ok(Some(_)) => ToggleOutcome::Unsubscribe(self.unsubscribe().await),
            Ok(None) => ToggleOutcome::Subscribe(self.subscribe().await),
            Err(e) => {
                tracing::error!("Toggle aborted, subscription unknown: {}", e);
                ToggleOutcome::Failed(e.to_string())
            }
        }
    }
}
