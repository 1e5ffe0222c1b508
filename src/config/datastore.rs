// ABOUTME: Persistent data store and migration configuration.
// ABOUTME: Flush, snapshot and ping commands default to a Redis-style store.

use nonempty::NonEmpty;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct DatastoreConfig {
    /// Name of the data store container.
    pub container: String,

    /// Synchronous flush run inside the container before the snapshot copy.
    #[serde(default = "default_flush_command")]
    pub flush_command: NonEmpty<String>,

    #[serde(default = "default_flush_wait", with = "humantime_serde")]
    pub flush_wait: Duration,

    /// Snapshot file path inside the container.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,

    #[serde(default = "default_ping_command")]
    pub ping_command: NonEmpty<String>,

    /// Token the ping command prints when the store is alive.
    #[serde(default = "default_ping_token")]
    pub ping_token: String,
}

fn words(head: &str, tail: &[&str]) -> NonEmpty<String> {
    NonEmpty {
        head: head.to_string(),
        tail: tail.iter().map(|s| s.to_string()).collect(),
    }
}

fn default_flush_command() -> NonEmpty<String> {
    words("redis-cli", &["SAVE"])
}

fn default_flush_wait() -> Duration {
    Duration::from_secs(5)
}

fn default_snapshot_path() -> String {
    "/data/dump.rdb".to_string()
}

fn default_ping_command() -> NonEmpty<String> {
    words("redis-cli", &["ping"])
}

fn default_ping_token() -> String {
    "PONG".to_string()
}

impl DatastoreConfig {
    pub fn new(container: impl Into<String>) -> Self {
        DatastoreConfig {
            container: container.into(),
            flush_command: default_flush_command(),
            flush_wait: default_flush_wait(),
            snapshot_path: default_snapshot_path(),
            ping_command: default_ping_command(),
            ping_token: default_ping_token(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MigrationConfig {
    /// Marker file whose presence means migrations are pending.
    #[serde(default = "default_marker")]
    pub marker: PathBuf,

    /// Command run in a one-off container of the new version.
    pub command: NonEmpty<String>,
}

fn default_marker() -> PathBuf {
    PathBuf::from("migrations/pending")
}

impl MigrationConfig {
    pub fn new(command: NonEmpty<String>) -> Self {
        MigrationConfig {
            marker: default_marker(),
            command,
        }
    }
}
