// Service worker bindings — push and notificationclick handlers
//
// Call `installWorkerHandlers(config)` once from the worker script. Each
// event's whole handling runs inside `waitUntil`, so the worker stays alive
// until every broadcast has been posted.

use crate::{delivery_config, describe, to_js};
use async_trait::async_trait;
use nudge_core::{
    ActiveNotification, ClientMessage, DeliveryHandler, DisplayedNotification, NotificationOptions,
    PageClient, PushDelivery, PushError, WorkerScope,
};
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use web_sys::{
    Client, ClientQueryOptions, ClientType, Notification, NotificationEvent, PushEvent,
    ServiceWorkerGlobalScope, WindowClient,
};

type Result<T> = std::result::Result<T, PushError>;

// ============================================================================
// SCOPE
// ============================================================================

pub struct BrowserWorkerScope {
    global: ServiceWorkerGlobalScope,
}

impl BrowserWorkerScope {
    pub fn current() -> Self {
        Self {
            global: js_sys::global().unchecked_into(),
        }
    }
}

pub struct BrowserClient {
    inner: Client,
}

#[async_trait(?Send)]
impl PageClient for BrowserClient {
    fn id(&self) -> String {
        self.inner.id()
    }

    fn url(&self) -> String {
        self.inner.url()
    }

    fn post_message(&self, message: &ClientMessage) -> Result<()> {
        let value = to_js(message).map_err(|e| PushError::Encoding(describe(&e)))?;
        self.inner
            .post_message(&value)
            .map_err(|e| PushError::Clients(describe(&e)))
    }

    async fn focus(&self) -> Result<bool> {
        let window = match self.inner.dyn_ref::<WindowClient>() {
            Some(window) => window,
            None => return Ok(false),
        };
        let pending = window.focus().map_err(|e| PushError::Window(describe(&e)))?;
        JsFuture::from(pending)
            .await
            .map_err(|e| PushError::Window(describe(&e)))?;
        Ok(true)
    }
}

#[async_trait(?Send)]
impl WorkerScope for BrowserWorkerScope {
    type Client = BrowserClient;

    async fn show_notification(&self, title: &str, options: &NotificationOptions) -> Result<()> {
        let options = to_js(options)
            .map_err(|e| PushError::Encoding(describe(&e)))?
            .unchecked_into::<web_sys::NotificationOptions>();
        let pending = self
            .global
            .registration()
            .show_notification_with_options(title, &options)
            .map_err(|e| PushError::Notification(describe(&e)))?;
        JsFuture::from(pending)
            .await
            .map_err(|e| PushError::Notification(describe(&e)))?;
        Ok(())
    }

    async fn get_notifications(&self) -> Result<Vec<ActiveNotification>> {
        let pending = self
            .global
            .registration()
            .get_notifications()
            .map_err(|e| PushError::Notification(describe(&e)))?;
        let list = JsFuture::from(pending)
            .await
            .map_err(|e| PushError::Notification(describe(&e)))?;
        Ok(js_sys::Array::from(&list)
            .iter()
            .map(|value| {
                let notification: Notification = value.unchecked_into();
                ActiveNotification {
                    title: notification.title(),
                    tag: notification.tag(),
                }
            })
            .collect())
    }

    async fn match_all(&self) -> Result<Vec<BrowserClient>> {
        let query = ClientQueryOptions::new();
        query.set_include_uncontrolled(true);
        query.set_type(ClientType::Window);
        let list = JsFuture::from(self.global.clients().match_all_with_options(&query))
            .await
            .map_err(|e| PushError::Clients(describe(&e)))?;
        Ok(js_sys::Array::from(&list)
            .iter()
            .map(|value| BrowserClient {
                inner: value.unchecked_into(),
            })
            .collect())
    }

    async fn open_window(&self, url: &str) -> Result<()> {
        JsFuture::from(self.global.clients().open_window(url))
            .await
            .map_err(|e| PushError::Window(describe(&e)))?;
        Ok(())
    }
}

/// Clicked notification from a `notificationclick` event.
pub struct BrowserNotification {
    inner: Notification,
}

impl DisplayedNotification for BrowserNotification {
    fn close(&self) {
        self.inner.close();
    }

    fn data(&self) -> Option<serde_json::Value> {
        let data = self.inner.data();
        if data.is_null() || data.is_undefined() {
            return None;
        }
        serde_wasm_bindgen::from_value(data).ok()
    }
}

// ============================================================================
// EVENT WIRING
// ============================================================================

/// Register `push` and `notificationclick` listeners on the worker scope.
///
/// `config` is an optional partial delivery config.
#[wasm_bindgen(js_name = installWorkerHandlers)]
pub fn install_worker_handlers(config: JsValue) -> std::result::Result<(), JsValue> {
    crate::init_logging();
    let config = delivery_config(config)?;
    let handler = Rc::new(DeliveryHandler::new(BrowserWorkerScope::current(), config));
    let global = handler.scope().global.clone();

    let on_push = {
        let handler = Rc::clone(&handler);
        Closure::wrap(Box::new(move |event: PushEvent| {
            let delivery = match event.data() {
                Some(data) => PushDelivery::with_data(data.text()),
                None => PushDelivery::empty(),
            };
            let handler = Rc::clone(&handler);
            let work = future_to_promise(async move {
                let outcome = handler.on_push(delivery).await;
                tracing::debug!("Push handled: {:?}", outcome);
                Ok(JsValue::UNDEFINED)
            });
            if let Err(e) = event.wait_until(&work) {
                tracing::error!("waitUntil rejected push handling: {}", describe(&e));
            }
        }) as Box<dyn FnMut(PushEvent)>)
    };
    global.add_event_listener_with_callback("push", on_push.as_ref().unchecked_ref())?;
    on_push.forget();

    let on_click = {
        let handler = Rc::clone(&handler);
        Closure::wrap(Box::new(move |event: NotificationEvent| {
            let notification = BrowserNotification {
                inner: event.notification(),
            };
            let handler = Rc::clone(&handler);
            let work = future_to_promise(async move {
                let outcome = handler.on_notification_click(&notification).await;
                tracing::debug!("Notification click handled: {:?}", outcome);
                Ok(JsValue::UNDEFINED)
            });
            if let Err(e) = event.wait_until(&work) {
                tracing::error!("waitUntil rejected click handling: {}", describe(&e));
            }
        }) as Box<dyn FnMut(NotificationEvent)>)
    };
    global.add_event_listener_with_callback("notificationclick", on_click.as_ref().unchecked_ref())?;
    on_click.forget();

    tracing::info!("Push worker handlers installed");
    Ok(())
}
