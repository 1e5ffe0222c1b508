// ABOUTME: Bounded-retry HTTP health polling shared by rollout and verification.
// ABOUTME: Fixed interval between attempts, no backoff, attempt number reported on success.

#[cfg(test)]
pub(crate) mod fake;
mod probe;

pub use probe::{HttpProbe, ProbeError, ProbeResponse, ReqwestProbe};

use crate::config::{Budget, HealthConfig};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Endpoint, attempt budget and success predicate for one polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckPolicy {
    pub endpoint: String,
    pub max_attempts: u32,
    pub interval: Duration,
    pub expected_status: u16,
    pub token: Option<String>,
}

impl HealthCheckPolicy {
    pub fn new(endpoint: impl Into<String>, budget: Budget) -> Self {
        Self {
            endpoint: endpoint.into(),
            max_attempts: budget.attempts,
            interval: budget.interval,
            expected_status: 200,
            token: None,
        }
    }

    /// Generous budget used while replacing instances.
    pub fn rollout(config: &HealthConfig) -> Self {
        Self::from_config(config, config.rollout)
    }

    /// Tight budget used after rollout.
    pub fn verify(config: &HealthConfig) -> Self {
        Self::from_config(config, config.verify)
    }

    fn from_config(config: &HealthConfig, budget: Budget) -> Self {
        Self {
            expected_status: config.expected_status,
            token: Some(config.token.clone()),
            ..Self::new(config.endpoint.clone(), budget)
        }
    }

    pub fn with_endpoint(&self, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..self.clone()
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Status must match, and the body must carry the token. A JSON body with
    /// a `status` field must equal the token; any other body must contain it.
    pub fn is_satisfied(&self, response: &ProbeResponse) -> bool {
        if response.status != self.expected_status {
            return false;
        }

        let Some(ref token) = self.token else {
            return true;
        };

        match serde_json::from_str::<serde_json::Value>(&response.body) {
            Ok(serde_json::Value::Object(map)) if map.contains_key("status") => map
                .get("status")
                .and_then(serde_json::Value::as_str)
                .is_some_and(|s| s.eq_ignore_ascii_case(token)),
            _ => response.body.contains(token.as_str()),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{endpoint} not healthy after {attempts} attempts (last: {last})")]
pub struct HealthCheckExhausted {
    pub endpoint: String,
    pub attempts: u32,
    pub last: String,
}

/// Polls an endpoint until its policy is satisfied or the budget runs out.
pub struct HealthCheckPoller<'a> {
    probe: &'a dyn HttpProbe,
}

impl<'a> HealthCheckPoller<'a> {
    pub fn new(probe: &'a dyn HttpProbe) -> Self {
        Self { probe }
    }

    /// Returns the attempt number that succeeded. Issues exactly
    /// `max_attempts` requests when the endpoint never becomes healthy and
    /// sleeps only between attempts.
    pub async fn poll(&self, policy: &HealthCheckPolicy) -> Result<u32, HealthCheckExhausted> {
        let mut last = String::from("no attempt made");

        for attempt in 1..=policy.max_attempts {
            match self.probe.get(&policy.endpoint).await {
                Ok(response) if policy.is_satisfied(&response) => {
                    info!(
                        endpoint = %policy.endpoint,
                        attempt,
                        max_attempts = policy.max_attempts,
                        "health check passed"
                    );
                    return Ok(attempt);
                }
                Ok(response) => {
                    last = format!("status {}", response.status);
                }
                Err(e) => {
                    last = e.to_string();
                }
            }

            debug!(
                endpoint = %policy.endpoint,
                attempt,
                max_attempts = policy.max_attempts,
                %last,
                "health check not passing yet"
            );

            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }

        Err(HealthCheckExhausted {
            endpoint: policy.endpoint.clone(),
            attempts: policy.max_attempts,
            last,
        })
    }
}
