//! Worker-side delivery handler.
//!
//! Turns inbound pushes into a shown notification plus broadcasts to every
//! open page. The handler keeps no mutable state, so concurrent pushes are
//! handled independently. The browser binding wraps the whole of
//! [`DeliveryHandler::on_push`] in the push event's `waitUntil`, which keeps
//! the worker alive until the broadcasts have been posted.

use crate::config::DeliveryConfig;
use crate::error::Result;
use crate::payload::{NotificationOptions, PushPayload};
use crate::platform::{DisplayedNotification, PageClient, WorkerScope};
use crate::protocol::{broadcast, now_millis, url_path, ClientMessage};

/// Raw push event as delivered by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushDelivery {
    pub data: Option<Vec<u8>>,
}

impl PushDelivery {
    pub fn empty() -> Self {
        Self { data: None }
    }

    pub fn with_data(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Push carried no payload
    Empty,
    /// Payload could not be decoded; nothing was shown
    Malformed(String),
    Delivered {
        /// Pages that received NOTIFICATION_CREATED
        pages: usize,
        /// Active notifications reported in NOTIFICATION_STATUS
        active: usize,
    },
    /// Showing or broadcasting failed; NOTIFICATION_ERROR went to `pages`
    Failed { error: String, pages: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Focused(String),
    Opened(String),
    Failed(String),
}

pub struct DeliveryHandler<S: WorkerScope> {
    scope: S,
    config: DeliveryConfig,
}

impl<S: WorkerScope> DeliveryHandler<S> {
    pub fn new(scope: S, config: DeliveryConfig) -> Self {
        Self { scope, config }
    }

    pub fn scope(&self) -> &S {
        &self.scope
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Handle one push event. Never fails; problems are logged or broadcast.
    pub async fn on_push(&self, event: PushDelivery) -> PushOutcome {
        let data = match event.data {
            Some(data) => data,
            None => {
                tracing::info!("Push event but no data");
                return PushOutcome::Empty;
            }
        };

        let payload = match PushPayload::decode(&data) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Error processing push: {}", e);
                return PushOutcome::Malformed(e.to_string());
            }
        };

        let options = NotificationOptions::from_payload(&payload, &self.config, now_millis());

        match self.deliver(&payload, &options).await {
            Ok((pages, active)) => PushOutcome::Delivered { pages, active },
            Err(e) => {
                let error = e.to_string();
                tracing::warn!("Push delivery failed: {}", error);
                let message = ClientMessage::NotificationError {
                    error: error.clone(),
                };
                let pages = match broadcast(&self.scope, &message).await {
                    Ok(pages) => pages,
                    Err(e) => {
                        tracing::error!("Could not report delivery failure to pages: {}", e);
                        0
                    }
                };
                PushOutcome::Failed { error, pages }
            }
        }
    }

    /// Show, then CREATED to every page, then STATUS to every page.
    async fn deliver(
        &self,
        payload: &PushPayload,
        options: &NotificationOptions,
    ) -> Result<(usize, usize)> {
        self.scope.show_notification(&payload.title, options).await?;

        let created = ClientMessage::NotificationCreated {
            title: payload.title.clone(),
            body: payload.body.clone(),
            timestamp: now_millis(),
        };
        let pages = broadcast(&self.scope, &created).await?;

        let active = self.scope.get_notifications().await?.len();
        let status = ClientMessage::NotificationStatus {
            count: active,
            message: self.config.status_message.clone(),
        };
        broadcast(&self.scope, &status).await?;

        Ok((pages, active))
    }

    /// Dismiss the clicked notification and bring the app to the front.
    pub async fn on_notification_click<N: DisplayedNotification>(
        &self,
        notification: &N,
    ) -> ClickOutcome {
        notification.close();

        let target = notification
            .data()
            .and_then(|data| data.get("defaultUrl").and_then(|v| v.as_str().map(String::from)))
            .unwrap_or_else(|| self.config.default_url.clone());

        match self.focus_or_open(&target).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Notification click handling failed: {}", e);
                ClickOutcome::Failed(e.to_string())
            }
        }
    }

    async fn focus_or_open(&self, target: &str) -> Result<ClickOutcome> {
        for client in self.scope.match_all().await? {
            if url_path(&client.url()) == url_path(target) && client.focus().await? {
                tracing::debug!("Focused existing window {}", client.id());
                return Ok(ClickOutcome::Focused(client.id()));
            }
        }
        self.scope.open_window(target).await?;
        Ok(ClickOutcome::Opened(target.to_string()))
    }
}
