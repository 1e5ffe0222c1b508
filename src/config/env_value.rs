// ABOUTME: Container environment values with references into the environment file.
// ABOUTME: Handles literal values and `env:` lookups with optional defaults.

use super::{ConfigError, EnvFile};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    pub fn resolve(&self, env: &EnvFile) -> Result<String, ConfigError> {
        match self {
            EnvValue::Literal(s) => Ok(s.clone()),
            EnvValue::FromEnv { var, default } => match env.get(var) {
                Some(val) => Ok(val.to_string()),
                None => default
                    .clone()
                    .ok_or_else(|| ConfigError::MissingKey(var.clone())),
            },
        }
    }
}

/// Resolve the manifest env map. Environment file values are injected first
/// so manifest entries win on conflict.
pub fn resolve_env_map(
    map: &HashMap<String, EnvValue>,
    env: &EnvFile,
) -> Result<HashMap<String, String>, ConfigError> {
    let mut resolved = env.values().clone();
    for (key, value) in map {
        resolved.insert(key.clone(), value.resolve(env)?);
    }
    Ok(resolved)
}
