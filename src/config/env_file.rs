// ABOUTME: Per-environment key/value file (.env.<environment>) loading.
// ABOUTME: Parsed with dotenv's iterator so the process environment is never mutated.

use super::ConfigError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Values read once from `.env.<environment>` at session start.
#[derive(Debug, Clone, Default)]
pub struct EnvFile {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl EnvFile {
    /// Location of the file for an environment under a project root.
    pub fn path_for(root: &Path, environment: &str) -> PathBuf {
        root.join(format!(".env.{environment}"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::EnvFileMissing(path.to_path_buf()));
        }

        let iter = dotenv::from_path_iter(path).map_err(|e| ConfigError::EnvFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut values = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| ConfigError::EnvFile {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            values.insert(key, value);
        }

        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    pub fn from_values(values: HashMap<String, String>) -> Self {
        Self {
            path: PathBuf::new(),
            values,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A value, treating empty strings as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }

    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_values_without_touching_process_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = EnvFile::path_for(dir.path(), "staging");
        std::fs::write(&path, "API_KEY=secret\n# comment\nEMPTY=\nQUOTED=\"a b\"\n").unwrap();

        let env = EnvFile::load(&path).unwrap();
        assert_eq!(env.get("API_KEY"), Some("secret"));
        assert_eq!(env.get("QUOTED"), Some("a b"));
        assert_eq!(env.get("EMPTY"), None);
        assert!(std::env::var("QUOTED").is_err());
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = EnvFile::path_for(dir.path(), "staging");
        match EnvFile::load(&path) {
            Err(ConfigError::EnvFileMissing(p)) => assert!(p.ends_with(".env.staging")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn require_names_the_missing_key() {
        let env = EnvFile::from_values(HashMap::new());
        assert!(matches!(
            env.require("API_KEY"),
            Err(ConfigError::MissingKey(k)) if k == "API_KEY"
        ));
    }
}
