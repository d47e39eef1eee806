// Nudge Core — push subscription lifecycle and delivery coordination
//
// Two cooperating parts share this crate: the page-side subscription
// controller (one per open page) and the worker-side delivery handler (one per
// origin). They never talk directly; the worker broadcasts `ClientMessage`s to
// every open page and each page reconciles against the platform.

pub mod config;
pub mod controller;
pub mod delivery;
pub mod error;
pub mod payload;
pub mod platform;
pub mod protocol;
pub mod sim;
pub mod subscription;
pub mod vapid;

pub use config::{ControllerConfig, DeliveryConfig};
pub use controller::{
    ControllerState, InitOutcome, RemovalOutcome, SubscribeOutcome, SubscriptionController,
    ToggleOutcome, UnsubscribeOutcome,
};
pub use delivery::{ClickOutcome, DeliveryHandler, PushDelivery, PushOutcome};
pub use error::PushError;
pub use payload::{NotificationAction, NotificationOptions, PushPayload};
pub use platform::{
    ActiveNotification, DisplayedNotification, HostBridge, PageClient, PagePlatform,
    WorkerRegistration, WorkerScope,
};
pub use protocol::{broadcast, ClientMessage, DisplayMode, HostEvent};
pub use subscription::{
    PermissionState, SubscribeOptions, SubscriptionDescriptor, SubscriptionKeys,
    SubscriptionState,
};
pub use vapid::{decode_base64url, encode_base64url, VapidPublicKey};
