// ABOUTME: Health endpoint configuration for rollout and verification polling.
// ABOUTME: Holds the shared endpoint, expected token and the two attempt budgets.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Shared health endpoint of the primary service.
    pub endpoint: String,

    /// Status token the response body must carry.
    #[serde(default = "default_token")]
    pub token: String,

    #[serde(default = "default_expected_status")]
    pub expected_status: u16,

    #[serde(default = "Budget::rollout")]
    pub rollout: Budget,

    #[serde(default = "Budget::verify")]
    pub verify: Budget,

    /// Pause after starting an instance before the first probe.
    #[serde(default = "default_warmup", with = "humantime_serde")]
    pub warmup: Duration,

    /// Pause between two verified replicas.
    #[serde(default = "default_settle", with = "humantime_serde")]
    pub settle: Duration,

    /// Per-request timeout.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

/// Attempt budget for one polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Budget {
    pub attempts: u32,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Budget {
    pub fn rollout() -> Self {
        Budget {
            attempts: 30,
            interval: Duration::from_secs(10),
        }
    }

    pub fn verify() -> Self {
        Budget {
            attempts: 3,
            interval: Duration::from_secs(2),
        }
    }
}

fn default_token() -> String {
    "healthy".to_string()
}

fn default_expected_status() -> u16 {
    200
}

fn default_warmup() -> Duration {
    Duration::from_secs(10)
}

fn default_settle() -> Duration {
    Duration::from_secs(5)
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

impl HealthConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        HealthConfig {
            endpoint: endpoint.into(),
            token: default_token(),
            expected_status: default_expected_status(),
            rollout: Budget::rollout(),
            verify: Budget::verify(),
            warmup: default_warmup(),
            settle: default_settle(),
            timeout: default_timeout(),
        }
    }
}
