// ABOUTME: Email notification channel using a sendmail-compatible transport.
// ABOUTME: Pipes an RFC 822 message to `<sendmail> -t` under a timeout.

use super::{NotificationChannel, NotificationEvent, NotifyError};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub struct EmailChannel {
    recipient: String,
    sendmail: String,
    timeout: Duration,
}

impl EmailChannel {
    pub fn new(recipient: &str, sendmail: &str, timeout: Duration) -> Self {
        Self {
            recipient: recipient.to_string(),
            sendmail: sendmail.to_string(),
            timeout,
        }
    }

    fn message(&self, event: &NotificationEvent) -> String {
        format!(
            "To: {}\nSubject: Deployment {}\n\n{}\n",
            self.recipient,
            event.status,
            event.text()
        )
    }

    async fn send(&self, message: String) -> Result<(), NotifyError> {
        let mut child = Command::new(&self.sendmail)
            .arg("-t")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| NotifyError::Email(format!("{}: {}", self.sendmail, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(message.as_bytes())
                .await
                .map_err(|e| NotifyError::Email(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| NotifyError::Email(e.to_string()))?;

        if !output.status.success() {
            return Err(NotifyError::Email(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let message = self.message(event);
        tokio::time::timeout(self.timeout, self.send(message))
            .await
            .map_err(|_| NotifyError::Email("transport timed out".to_string()))?
    }
}
