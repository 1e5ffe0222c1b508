// ABOUTME: Verification, preflight and notification settings.
// ABOUTME: Each section carries defaults so a minimal manifest stays short.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerificationConfig {
    /// Secondary health endpoints (detailed, domain-specific, monitoring).
    #[serde(default)]
    pub checks: Vec<CheckConfig>,

    #[serde(default)]
    pub smoke: Option<SmokeConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckConfig {
    pub name: String,
    pub url: String,

    /// Optional checks only warn when they fail.
    #[serde(default = "default_required")]
    pub required: bool,

    /// Overrides the health token for this endpoint.
    #[serde(default)]
    pub token: Option<String>,
}

fn default_required() -> bool {
    true
}

/// One functional request against the API surface.
#[derive(Debug, Clone, Deserialize)]
pub struct SmokeConfig {
    pub url: String,

    #[serde(default = "default_smoke_body")]
    pub body: serde_json::Value,
}

fn default_smoke_body() -> serde_json::Value {
    serde_json::json!({ "url": "https://example.com" })
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreflightConfig {
    #[serde(default = "default_min_free_disk_gib")]
    pub min_free_disk_gib: u64,

    /// Orchestration tool that must be on PATH.
    #[serde(default = "default_tool")]
    pub tool: String,

    /// Key the environment file must define.
    #[serde(default = "default_credential_key")]
    pub credential_key: String,
}

fn default_min_free_disk_gib() -> u64 {
    5
}

fn default_tool() -> String {
    "docker".to_string()
}

fn default_credential_key() -> String {
    "API_KEY".to_string()
}

impl Default for PreflightConfig {
    fn default() -> Self {
        PreflightConfig {
            min_free_disk_gib: default_min_free_disk_gib(),
            tool: default_tool(),
            credential_key: default_credential_key(),
        }
    }
}

/// Environment file keys that enable each notification channel.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_webhook_key")]
    pub webhook_key: String,

    #[serde(default = "default_email_key")]
    pub email_key: String,

    /// sendmail-compatible binary reading the message on stdin.
    #[serde(default = "default_sendmail")]
    pub sendmail: String,

    #[serde(default = "default_notify_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_webhook_key() -> String {
    "SLACK_WEBHOOK_URL".to_string()
}

fn default_email_key() -> String {
    "NOTIFICATION_EMAIL".to_string()
}

fn default_sendmail() -> String {
    "sendmail".to_string()
}

fn default_notify_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for NotificationConfig {
    fn default() -> Self {
        NotificationConfig {
            webhook_key: default_webhook_key(),
            email_key: default_email_key(),
            sendmail: default_sendmail(),
            timeout: default_notify_timeout(),
        }
    }
}
