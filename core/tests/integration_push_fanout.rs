//! Worker-side delivery observed from the pages of one origin.
//!
//! Run with: cargo test --test integration_push_fanout

use nudge_core::sim::{SimHost, SimNotification, SimOrigin};
use nudge_core::{
    ClickOutcome, ClientMessage, ControllerConfig, DeliveryConfig, DeliveryHandler, PushDelivery,
    PushOutcome, SubscribeOutcome, SubscriptionController, SubscriptionState,
};
use serde_json::json;

const VAPID_KEY: &str =
    "BEl62iUYgUivxIkv69yViEuiBIa-Ib9-SkvMeAtA3LFgDzkrxZJjSgSnfckjBJuBkr3qBUYIHBQFLXYp5Nksh8U";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_push_reaches_every_open_page() {
    init_tracing();
    let origin = SimOrigin::new();
    let first = origin.open_page("https://app.example.com/");
    let second = origin.open_page("https://app.example.com/inbox");
    let handler = DeliveryHandler::new(origin.worker_scope(), DeliveryConfig::default());

    let outcome = handler
        .on_push(PushDelivery::with_data(
            json!({"title": "Order shipped", "body": "Arrives Tuesday"}).to_string(),
        ))
        .await;

    assert_eq!(outcome, PushOutcome::Delivered { pages: 2, active: 1 });
    for page in [&first, &second] {
        let kinds: Vec<&str> = page.inbox().iter().map(|m| m.kind()).collect();
        assert_eq!(kinds, vec!["NOTIFICATION_CREATED", "NOTIFICATION_STATUS"]);
    }
}

#[tokio::test]
async fn test_closed_page_misses_later_pushes() {
    init_tracing();
    let origin = SimOrigin::new();
    let stays = origin.open_page("https://app.example.com/");
    let leaves = origin.open_page("https://app.example.com/inbox");
    let handler = DeliveryHandler::new(origin.worker_scope(), DeliveryConfig::default());

    handler
        .on_push(PushDelivery::with_data(r#"{"title":"One","body":"1","tag":"one"}"#))
        .await;
    leaves.close();
    let outcome = handler
        .on_push(PushDelivery::with_data(r#"{"title":"Two","body":"2","tag":"two"}"#))
        .await;

    assert_eq!(outcome, PushOutcome::Delivered { pages: 1, active: 2 });
    assert_eq!(stays.inbox().len(), 4);
    assert_eq!(leaves.inbox().len(), 2);
}

#[tokio::test]
async fn test_payload_overrides_and_data_reach_tray() {
    init_tracing();
    let origin = SimOrigin::new();
    let handler = DeliveryHandler::new(origin.worker_scope(), DeliveryConfig::default());
    let payload = json!({
        "title": "Build failed",
        "body": "main is red",
        "icon": "/icons/ci.png",
        "tag": "ci",
        "actions": [{"action": "open", "title": "Open"}],
        "data": {"run": 42, "defaultUrl": "/elsewhere"}
    });

    handler
        .on_push(PushDelivery::with_data(payload.to_string()))
        .await;

    let shown = origin.shown_notifications();
    assert_eq!(shown.len(), 1);
    let options = &shown[0].options;
    assert_eq!(options.icon, "/icons/ci.png");
    assert_eq!(options.badge, "/images/logo.png");
    assert_eq!(options.tag, "ci");
    assert_eq!(options.actions.len(), 1);
    assert_eq!(options.data["run"], 42);
    assert_eq!(options.data["defaultUrl"], "/");
    assert!(options.require_interaction);
}

#[tokio::test]
async fn test_bad_pushes_leave_pages_quiet() {
    init_tracing();
    let origin = SimOrigin::new();
    let page = origin.open_page("https://app.example.com/");
    let handler = DeliveryHandler::new(origin.worker_scope(), DeliveryConfig::default());

    assert_eq!(handler.on_push(PushDelivery::empty()).await, PushOutcome::Empty);
    assert!(matches!(
        handler.on_push(PushDelivery::with_data(vec![0xff, 0xfe, 0x00])).await,
        PushOutcome::Malformed(_)
    ));
    assert!(matches!(
        handler
            .on_push(PushDelivery::with_data(r#"{"body":"no title"}"#))
            .await,
        PushOutcome::Malformed(_)
    ));

    assert!(page.inbox().is_empty());
    assert!(origin.shown_notifications().is_empty());
}

#[tokio::test]
async fn test_subscribed_page_receives_push_then_click_focuses_it() {
    init_tracing();
    let origin = SimOrigin::new();
    let page = origin.open_page("https://app.example.com/");
    let controller = SubscriptionController::new(
        page.clone(),
        SimHost::default(),
        ControllerConfig::with_vapid_key(VAPID_KEY),
    );
    controller.initialize().await;
    assert!(matches!(
        controller.subscribe().await,
        SubscribeOutcome::Subscribed(_)
    ));

    let handler = DeliveryHandler::new(origin.worker_scope(), DeliveryConfig::default());
    handler
        .on_push(PushDelivery::with_data(r#"{"title":"Hi","body":"there"}"#))
        .await;

    // Receipt of a broadcast prompts the page to reconcile.
    assert!(matches!(
        page.inbox().first(),
        Some(ClientMessage::NotificationCreated { .. })
    ));
    assert_eq!(
        controller.refresh_status().await,
        Some(SubscriptionState::Subscribed)
    );

    let shown = origin.shown_notifications();
    let clicked = SimNotification::new(Some(shown[0].options.data.clone()));
    assert_eq!(
        handler.on_notification_click(&clicked).await,
        ClickOutcome::Focused(page.id())
    );
    assert!(clicked.is_closed());
}
