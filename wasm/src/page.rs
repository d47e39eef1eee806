// Page bindings — SubscriptionController over navigator.serviceWorker
//
// The host application constructs a `PushNotificationHook` with two
// callbacks: `pushEvent(name, payload)` receives controller events and
// `render(status)` receives "subscribed" / "unsubscribed".

use crate::{client_message, describe, to_js};
use async_trait::async_trait;
use nudge_core::{
    ControllerConfig, DisplayMode, HostBridge, HostEvent, InitOutcome, PagePlatform, PermissionState,
    PushError, RemovalOutcome, SubscribeOptions, SubscriptionController, SubscriptionDescriptor,
    SubscriptionState, ToggleOutcome, WorkerRegistration,
};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use web_sys::{
    CustomEvent, MessageEvent, Notification, PushManager, PushSubscription,
    PushSubscriptionOptionsInit, ServiceWorkerContainer, ServiceWorkerRegistration, Window,
};

type Result<T> = std::result::Result<T, PushError>;

fn window() -> Result<Window> {
    web_sys::window().ok_or(PushError::Unsupported)
}

// ============================================================================
// PLATFORM
// ============================================================================

/// Page context backed by `navigator.serviceWorker`.
pub struct BrowserPage {
    window: Window,
}

impl BrowserPage {
    pub fn new() -> Result<Self> {
        Ok(Self { window: window()? })
    }

    fn container(&self) -> ServiceWorkerContainer {
        self.window.navigator().service_worker()
    }
}

#[async_trait(?Send)]
impl PagePlatform for BrowserPage {
    type Registration = BrowserRegistration;

    fn supports_workers(&self) -> bool {
        let navigator = self.window.navigator();
        js_sys::Reflect::has(&navigator, &JsValue::from_str("serviceWorker")).unwrap_or(false)
            && js_sys::Reflect::has(&self.window, &JsValue::from_str("PushManager"))
                .unwrap_or(false)
    }

    async fn register_worker(&self, script_url: &str) -> Result<BrowserRegistration> {
        let registration = JsFuture::from(self.container().register(script_url))
            .await
            .map_err(|e| PushError::Registration(describe(&e)))?;
        Ok(BrowserRegistration {
            inner: registration.unchecked_into(),
        })
    }

    async fn wait_until_active(&self, _registration: &BrowserRegistration) -> Result<()> {
        let ready = self
            .container()
            .ready()
            .map_err(|e| PushError::Registration(describe(&e)))?;
        JsFuture::from(ready)
            .await
            .map_err(|e| PushError::Registration(describe(&e)))?;
        Ok(())
    }

    async fn request_permission(&self) -> Result<PermissionState> {
        let prompt =
            Notification::request_permission().map_err(|e| PushError::Permission(describe(&e)))?;
        let answer = JsFuture::from(prompt)
            .await
            .map_err(|e| PushError::Permission(describe(&e)))?;
        answer
            .as_string()
            .ok_or_else(|| PushError::Permission("permission prompt returned no state".to_string()))?
            .parse::<PermissionState>()
            .map_err(PushError::Permission)
    }
}

#[derive(Clone)]
pub struct BrowserRegistration {
    inner: ServiceWorkerRegistration,
}

impl BrowserRegistration {
    fn push_manager(&self) -> Result<PushManager> {
        self.inner
            .push_manager()
            .map_err(|e| PushError::Subscription(describe(&e)))
    }

    async fn live_subscription(&self) -> Result<Option<PushSubscription>> {
        let pending = self
            .push_manager()?
            .get_subscription()
            .map_err(|e| PushError::Subscription(describe(&e)))?;
        let value = JsFuture::from(pending)
            .await
            .map_err(|e| PushError::Subscription(describe(&e)))?;
        if value.is_null() || value.is_undefined() {
            return Ok(None);
        }
        Ok(Some(value.unchecked_into()))
    }
}

/// `JSON.stringify` invokes the subscription's own `toJSON`.
fn describe_subscription(subscription: &PushSubscription) -> Result<SubscriptionDescriptor> {
    let json = js_sys::JSON::stringify(subscription)
        .map_err(|e| PushError::Encoding(describe(&e)))?;
    Ok(serde_json::from_str(&String::from(json))?)
}

#[async_trait(?Send)]
impl WorkerRegistration for BrowserRegistration {
    async fn get_subscription(&self) -> Result<Option<SubscriptionDescriptor>> {
        match self.live_subscription().await? {
            Some(subscription) => describe_subscription(&subscription).map(Some),
            None => Ok(None),
        }
    }

    async fn subscribe(&self, options: &SubscribeOptions) -> Result<SubscriptionDescriptor> {
        let init = PushSubscriptionOptionsInit::new();
        init.set_user_visible_only(options.user_visible_only);
        let key = js_sys::Uint8Array::from(options.application_server_key.as_slice());
        js_sys::Reflect::set(&init, &JsValue::from_str("applicationServerKey"), &key)
            .map_err(|e| PushError::Subscription(describe(&e)))?;

        let pending = self
            .push_manager()?
            .subscribe_with_options(&init)
            .map_err(|e| PushError::Subscription(describe(&e)))?;
        let subscription: PushSubscription = JsFuture::from(pending)
            .await
            .map_err(|e| PushError::Subscription(describe(&e)))?
            .unchecked_into();
        describe_subscription(&subscription)
    }

    async fn unsubscribe(&self, endpoint: &str) -> Result<bool> {
        let subscription = match self.live_subscription().await? {
            Some(subscription) if subscription.endpoint() == endpoint => subscription,
            _ => return Ok(false),
        };
        let pending = subscription
            .unsubscribe()
            .map_err(|e| PushError::Subscription(describe(&e)))?;
        let removed = JsFuture::from(pending)
            .await
            .map_err(|e| PushError::Subscription(describe(&e)))?;
        Ok(removed.as_bool().unwrap_or(false))
    }
}

// ============================================================================
// HOST
// ============================================================================

/// Host application reached through two JS callbacks.
pub struct JsHost {
    window: Window,
    push_event: js_sys::Function,
    render: js_sys::Function,
}

impl JsHost {
    pub fn new(window: Window, push_event: js_sys::Function, render: js_sys::Function) -> Self {
        Self {
            window,
            push_event,
            render,
        }
    }

    fn matches_media(&self, query: &str) -> bool {
        matches!(self.window.match_media(query), Ok(Some(list)) if list.matches())
    }
}

impl HostBridge for JsHost {
    fn emit(&self, event: HostEvent) {
        let payload = match to_js(&event.payload()) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Could not encode {} event: {}", event.name(), describe(&e));
                return;
            }
        };
        if let Err(e) = self
            .push_event
            .call2(&JsValue::NULL, &JsValue::from_str(event.name()), &payload)
        {
            tracing::warn!("pushEvent callback threw: {}", describe(&e));
        }
    }

    fn render_status(&self, state: SubscriptionState) {
        if let Err(e) = self
            .render
            .call1(&JsValue::NULL, &JsValue::from_str(&state.to_string()))
        {
            tracing::warn!("render callback threw: {}", describe(&e));
        }
    }

    fn display_mode(&self) -> DisplayMode {
        if self.matches_media("(display-mode: standalone)") {
            return DisplayMode::Standalone;
        }
        if self.matches_media("(display-mode: fullscreen)") {
            return DisplayMode::Fullscreen;
        }
        if self.matches_media("(display-mode: minimal-ui)") {
            return DisplayMode::MinimalUi;
        }
        let standalone = js_sys::Reflect::get(&self.window.navigator(), &JsValue::from_str("standalone"))
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if standalone {
            DisplayMode::IosStandalone
        } else {
            DisplayMode::Browser
        }
    }
}

// ============================================================================
// JS HOOK
// ============================================================================

type Controller = SubscriptionController<BrowserPage, JsHost>;

#[wasm_bindgen]
pub struct PushNotificationHook {
    controller: Rc<Controller>,
    /// Event listeners stay registered for as long as the hook lives.
    listeners: RefCell<Vec<Closure<dyn FnMut(web_sys::Event)>>>,
}

#[wasm_bindgen]
impl PushNotificationHook {
    /// `config` is `{ vapid_public_key, worker_script_url? }`.
    #[wasm_bindgen(constructor)]
    pub fn new(
        config: JsValue,
        push_event: js_sys::Function,
        render: js_sys::Function,
    ) -> std::result::Result<PushNotificationHook, JsValue> {
        crate::init_logging();
        let config: ControllerConfig =
            serde_wasm_bindgen::from_value(config).map_err(|e| JsValue::from_str(&e.to_string()))?;
        let page = BrowserPage::new().map_err(crate::js_error)?;
        let host = JsHost::new(page.window.clone(), push_event, render);
        Ok(Self {
            controller: Rc::new(SubscriptionController::new(page, host, config)),
            listeners: RefCell::new(Vec::new()),
        })
    }

    /// Resolves to the rendered status, or to "unsupported". Rejects on
    /// registration failure.
    pub fn init(&self) -> js_sys::Promise {
        let controller = Rc::clone(&self.controller);
        future_to_promise(async move {
            match controller.initialize().await {
                InitOutcome::Ready(status) => Ok(JsValue::from_str(&status.to_string())),
                InitOutcome::Unsupported => Ok(JsValue::from_str("unsupported")),
                InitOutcome::Failed(reason) => Err(JsValue::from_str(&reason)),
            }
        })
    }

    /// Subscribe control handler. Resolves to whether the page is subscribed
    /// afterwards.
    pub fn toggle(&self) -> js_sys::Promise {
        let controller = Rc::clone(&self.controller);
        future_to_promise(async move {
            match controller.toggle().await {
                ToggleOutcome::Subscribe(outcome) => tracing::debug!("Toggle: {:?}", outcome),
                ToggleOutcome::Unsubscribe(outcome) => tracing::debug!("Toggle: {:?}", outcome),
                ToggleOutcome::Failed(reason) => return Err(JsValue::from_str(&reason)),
            }
            Ok(JsValue::from_bool(controller.query_is_subscribed().await))
        })
    }

    #[wasm_bindgen(js_name = isSubscribed)]
    pub fn is_subscribed(&self) -> js_sys::Promise {
        let controller = Rc::clone(&self.controller);
        future_to_promise(async move { Ok(JsValue::from_bool(controller.query_is_subscribed().await)) })
    }

    #[wasm_bindgen(js_name = refreshStatus)]
    pub fn refresh_status(&self) -> js_sys::Promise {
        let controller = Rc::clone(&self.controller);
        future_to_promise(async move {
            Ok(match controller.refresh_status().await {
                Some(status) => JsValue::from_str(&status.to_string()),
                None => JsValue::NULL,
            })
        })
    }

    /// Resolves to `true` when the removed endpoint was this device's.
    #[wasm_bindgen(js_name = deviceRemoved)]
    pub fn device_removed(&self, endpoint: String) -> js_sys::Promise {
        let controller = Rc::clone(&self.controller);
        future_to_promise(async move {
            match controller.on_device_removed(&endpoint).await {
                RemovalOutcome::Revoked => Ok(JsValue::TRUE),
                RemovalOutcome::Ignored | RemovalOutcome::NotReady(_) => Ok(JsValue::FALSE),
                RemovalOutcome::Failed(reason) => Err(JsValue::from_str(&reason)),
            }
        })
    }

    /// Listen for a window `CustomEvent` whose `detail.endpoint` names a
    /// device revoked by the backend.
    #[wasm_bindgen(js_name = listenDeviceRemoved)]
    pub fn listen_device_removed(&self, event_name: &str) -> std::result::Result<(), JsValue> {
        let controller = Rc::clone(&self.controller);
        let closure = Closure::wrap(Box::new(move |event: web_sys::Event| {
            event.prevent_default();
            let endpoint = event
                .dyn_ref::<CustomEvent>()
                .and_then(|e| js_sys::Reflect::get(&e.detail(), &JsValue::from_str("endpoint")).ok())
                .and_then(|v| v.as_string());
            let endpoint = match endpoint {
                Some(endpoint) => endpoint,
                None => {
                    tracing::warn!("Device removal event without an endpoint");
                    return;
                }
            };
            let controller = Rc::clone(&controller);
            wasm_bindgen_futures::spawn_local(async move {
                match controller.on_device_removed(&endpoint).await {
                    RemovalOutcome::NotReady(state) => {
                        tracing::debug!("Device removal dropped in {} state", state)
                    }
                    RemovalOutcome::Failed(reason) => {
                        tracing::warn!("Device removal failed: {}", reason)
                    }
                    RemovalOutcome::Revoked | RemovalOutcome::Ignored => {}
                }
            });
        }) as Box<dyn FnMut(web_sys::Event)>);

        window()
            .map_err(crate::js_error)?
            .add_event_listener_with_callback(event_name, closure.as_ref().unchecked_ref())?;
        self.listeners.borrow_mut().push(closure);
        Ok(())
    }

    /// Forward worker broadcasts to `callback(message)` and re-render the
    /// status after each one. Unknown messages are dropped.
    #[wasm_bindgen(js_name = listenWorkerMessages)]
    pub fn listen_worker_messages(&self, callback: js_sys::Function) -> std::result::Result<(), JsValue> {
        let controller = Rc::clone(&self.controller);
        let closure = Closure::wrap(Box::new(move |event: web_sys::Event| {
            let data = match event.dyn_ref::<MessageEvent>() {
                Some(message) => message.data(),
                None => return,
            };
            let message = match client_message(data) {
                Ok(message) => message,
                Err(e) => {
                    tracing::debug!("Ignoring worker message: {}", describe(&e));
                    return;
                }
            };
            tracing::debug!("Worker message: {}", message.kind());
            match to_js(&message) {
                Ok(value) => {
                    if let Err(e) = callback.call1(&JsValue::NULL, &value) {
                        tracing::warn!("Worker message callback threw: {}", describe(&e));
                    }
                }
                Err(e) => tracing::error!("Could not encode worker message: {}", describe(&e)),
            }
            let controller = Rc::clone(&controller);
            wasm_bindgen_futures::spawn_local(async move {
                controller.refresh_status().await;
            });
        }) as Box<dyn FnMut(web_sys::Event)>);

        window()
            .map_err(crate::js_error)?
            .navigator()
            .service_worker()
            .add_event_listener_with_callback("message", closure.as_ref().unchecked_ref())?;
        self.listeners.borrow_mut().push(closure);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    fn hook() -> PushNotificationHook {
        let config = to_js(&ControllerConfig::default()).unwrap();
        let noop = js_sys::Function::new_no_args("");
        PushNotificationHook::new(config, noop.clone(), noop).unwrap()
    }

    #[wasm_bindgen_test]
    fn test_constructing_twice_does_not_panic() {
        crate::init_logging();
        let _first = hook();
        let _second = hook();
    }

    #[wasm_bindgen_test]
    fn test_device_removed_event_is_consumed() {
        let hook = hook();
        hook.listen_device_removed("nudge:device_removed").unwrap();

        let detail = js_sys::Object::new();
        js_sys::Reflect::set(&detail, &"endpoint".into(), &"https://push.example.net/x".into())
            .unwrap();
        let init = web_sys::CustomEventInit::new();
        init.set_cancelable(true);
        init.set_detail(&detail);
        let event =
            CustomEvent::new_with_event_init_dict("nudge:device_removed", &init).unwrap();

        // Not yet initialized: the removal is dropped, but the event is still
        // marked handled.
        let not_canceled = web_sys::window().unwrap().dispatch_event(&event).unwrap();
        assert!(!not_canceled);
        assert!(event.default_prevented());
    }
}
