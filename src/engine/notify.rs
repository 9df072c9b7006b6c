// Deckhand Engine — Notifications
// One-line operational summaries pushed to the user's notification
// channel. The engine only knows the trait; the default implementation
// posts to an ntfy-style webhook.

use async_trait::async_trait;
use log::info;

use crate::atoms::error::EngineResult;

/// External notification collaborator.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> EngineResult<()>;
}

/// Posts plain-text messages to a webhook URL (ntfy, Gotify, or anything
/// that accepts `POST <url>` with a text body).
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str) -> EngineResult<()> {
        info!("[notify] → {message}");
        self.client
            .post(&self.url)
            .body(message.to_string())
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
