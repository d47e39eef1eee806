// nudge-wasm — browser bindings for the page controller and the push worker
//
// `page` drives a SubscriptionController from a document; `worker` installs
// push and notificationclick handlers in the service worker global scope.
// Both only exist on wasm32. The free functions below are target-independent.

#[cfg(target_arch = "wasm32")]
pub mod page;
#[cfg(target_arch = "wasm32")]
pub mod worker;

use nudge_core::{
    decode_base64url, ClientMessage, DeliveryConfig, NotificationOptions, PushPayload,
};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Install the panic hook and the console subscriber. Safe to call more than
/// once; later calls keep the first subscriber.
#[wasm_bindgen]
pub fn init_logging() {
    console_error_panic_hook::set_once();
    if tracing_wasm::try_set_as_global_default().is_err() {
        tracing::debug!("Console logging already initialized");
    }
}

/// Decode a base64url VAPID key into the bytes `pushManager.subscribe` wants.
#[wasm_bindgen(js_name = decodeVapidKey)]
pub fn decode_vapid_key(key: &str) -> Result<Vec<u8>, JsValue> {
    decode_base64url(key).map_err(js_error)
}

/// Build the notification a push payload would produce, without showing it.
///
/// `config` is an optional partial delivery config; missing fields take
/// their defaults.
#[wasm_bindgen(js_name = previewNotification)]
pub fn preview_notification(payload: &str, config: JsValue) -> Result<JsValue, JsValue> {
    let config = delivery_config(config)?;
    let payload = PushPayload::decode(payload.as_bytes()).map_err(js_error)?;
    let options = NotificationOptions::from_payload(&payload, &config, js_sys::Date::now() as u64);
    to_js(&Preview {
        title: &payload.title,
        options: &options,
    })
}

/// Validate a message posted by the worker. Returns it unchanged, or throws.
#[wasm_bindgen(js_name = parseClientMessage)]
pub fn parse_client_message(data: JsValue) -> Result<JsValue, JsValue> {
    let message = client_message(data)?;
    to_js(&message)
}

#[derive(Serialize)]
struct Preview<'a> {
    title: &'a str,
    options: &'a NotificationOptions,
}

pub(crate) fn delivery_config(config: JsValue) -> Result<DeliveryConfig, JsValue> {
    if config.is_undefined() || config.is_null() {
        return Ok(DeliveryConfig::default());
    }
    serde_wasm_bindgen::from_value(config).map_err(|e| JsValue::from_str(&e.to_string()))
}

pub(crate) fn client_message(data: JsValue) -> Result<ClientMessage, JsValue> {
    let value: serde_json::Value =
        serde_wasm_bindgen::from_value(data).map_err(|e| JsValue::from_str(&e.to_string()))?;
    ClientMessage::from_json(value).map_err(js_error)
}

/// Serialize to a plain JS object (maps become objects, not `Map`s).
pub(crate) fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

pub(crate) fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Best-effort text for a rejected promise or thrown value.
#[cfg(target_arch = "wasm32")]
pub(crate) fn describe(value: &JsValue) -> String {
    if let Some(text) = value.as_string() {
        return text;
    }
    if let Some(err) = value.dyn_ref::<js_sys::Error>() {
        return String::from(err.message());
    }
    format!("{:?}", value)
}
