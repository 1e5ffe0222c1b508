// ABOUTME: Chat webhook notification channel.
// ABOUTME: POSTs a JSON {"text": ...} payload with a bounded timeout.

use super::{NotificationChannel, NotificationEvent, NotifyError};
use async_trait::async_trait;
use std::time::Duration;

pub struct WebhookChannel {
    url: String,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Webhook(e.to_string()))?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let payload = serde_json::json!({ "text": event.text() });
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Webhook(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Webhook(format!(
                "endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
