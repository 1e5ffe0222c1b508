// ABOUTME: Fire-and-forget deployment status notifications.
// ABOUTME: Dispatches events to webhook and email channels, swallowing channel failures.

mod email;
mod webhook;

pub use email::EmailChannel;
pub use webhook::WebhookChannel;

use crate::config::{EnvFile, NotificationConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationStatus::Info => "info",
            NotificationStatus::Success => "success",
            NotificationStatus::Warning => "warning",
            NotificationStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationEvent {
    pub status: NotificationStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(status: NotificationStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// One-line rendering shared by every channel.
    pub fn text(&self) -> String {
        let host = gethostname::gethostname();
        format!(
            "[{}] {} ({} on {})",
            self.status.to_string().to_uppercase(),
            self.message,
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            host.to_string_lossy()
        )
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook delivery failed: {0}")]
    Webhook(String),

    #[error("email delivery failed: {0}")]
    Email(String),
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotifyError>;
}

/// Delivers each event to every configured channel. Never fails.
#[derive(Default)]
pub struct NotificationDispatcher {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl NotificationDispatcher {
    pub fn new(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    /// Enable the channels whose keys are set in the environment file.
    pub fn from_env(config: &NotificationConfig, env: &EnvFile) -> Self {
        let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();

        if let Some(url) = env.get(&config.webhook_key) {
            match WebhookChannel::new(url, config.timeout) {
                Ok(channel) => channels.push(Box::new(channel)),
                Err(e) => warn!("webhook channel disabled: {e}"),
            }
        }

        if let Some(recipient) = env.get(&config.email_key) {
            channels.push(Box::new(EmailChannel::new(
                recipient,
                &config.sendmail,
                config.timeout,
            )));
        }

        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub async fn dispatch(&self, event: NotificationEvent) {
        for channel in &self.channels {
            match channel.deliver(&event).await {
                Ok(()) => debug!(channel = channel.name(), "notification delivered"),
                Err(e) => warn!(channel = channel.name(), "notification dropped: {e}"),
            }
        }
    }

    pub async fn notify(&self, status: NotificationStatus, message: impl Into<String>) {
        self.dispatch(NotificationEvent::new(status, message)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct Recording {
        fail: bool,
        seen: Arc<Mutex<Vec<NotificationStatus>>>,
    }

    #[async_trait]
    impl NotificationChannel for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
            self.seen.lock().push(event.status);
            if self.fail {
                Err(NotifyError::Webhook("500".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn failing_channel_does_not_stop_the_others() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = NotificationDispatcher::new(vec![
            Box::new(Recording {
                fail: true,
                seen: seen.clone(),
            }),
            Box::new(Recording {
                fail: false,
                seen: seen.clone(),
            }),
        ]);

        dispatcher
            .notify(NotificationStatus::Error, "deploy failed")
            .await;

        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn unconfigured_channels_are_skipped() {
        let env = EnvFile::from_values(HashMap::new());
        let dispatcher = NotificationDispatcher::from_env(&NotificationConfig::default(), &env);
        assert_eq!(dispatcher.channel_count(), 0);

        let env = EnvFile::from_values(HashMap::from([
            ("SLACK_WEBHOOK_URL".to_string(), "http://127.0.0.1:9/hook".to_string()),
            ("NOTIFICATION_EMAIL".to_string(), "ops@example.com".to_string()),
        ]));
        let dispatcher = NotificationDispatcher::from_env(&NotificationConfig::default(), &env);
        assert_eq!(dispatcher.channel_count(), 2);
    }

    #[test]
    fn text_carries_status_and_message() {
        let event = NotificationEvent::new(NotificationStatus::Success, "v1.2.3 live");
        let text = event.text();
        assert!(text.starts_with("[SUCCESS] v1.2.3 live"));
    }
}
