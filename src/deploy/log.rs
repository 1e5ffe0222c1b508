// ABOUTME: Append-only, timestamped session log used for audit and the final summary.
// ABOUTME: Entries go to a per-session file, to tracing, and to memory.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub step: String,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
            self.level,
            self.step,
            self.message
        )
    }
}

pub struct SessionLog {
    path: Option<PathBuf>,
    file: Mutex<Option<LineWriter<File>>>,
    entries: Mutex<Vec<LogEntry>>,
}

impl SessionLog {
    /// Open `<log_dir>/deploy-<YYYYmmdd_HHMMSS>.log`. Falls back to memory
    /// only when the file cannot be opened.
    pub fn open(log_dir: &Path, started_at: DateTime<Utc>) -> Self {
        let path = log_dir.join(format!("deploy-{}.log", started_at.format("%Y%m%d_%H%M%S")));

        let file = std::fs::create_dir_all(log_dir).and_then(|()| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
        });

        match file {
            Ok(file) => Self {
                path: Some(path),
                file: Mutex::new(Some(LineWriter::new(file))),
                entries: Mutex::new(Vec::new()),
            },
            Err(e) => {
                tracing::warn!(
                    "session log {} unavailable, keeping entries in memory: {e}",
                    path.display()
                );
                Self::in_memory()
            }
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            file: Mutex::new(None),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&self, level: LogLevel, step: &str, message: impl Into<String>) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            step: step.to_string(),
            message: message.into(),
        };

        match level {
            LogLevel::Debug => tracing::debug!(step, "{}", entry.message),
            LogLevel::Info => tracing::info!(step, "{}", entry.message),
            LogLevel::Warn => tracing::warn!(step, "{}", entry.message),
            LogLevel::Error => tracing::error!(step, "{}", entry.message),
        }

        if let Some(writer) = self.file.lock().as_mut()
            && let Err(e) = writeln!(writer, "{entry}")
        {
            tracing::debug!("session log write failed: {e}");
        }

        self.entries.lock().push(entry);
    }

    pub fn debug(&self, step: &str, message: impl Into<String>) {
        self.record(LogLevel::Debug, step, message);
    }

    pub fn info(&self, step: &str, message: impl Into<String>) {
        self.record(LogLevel::Info, step, message);
    }

    pub fn warn(&self, step: &str, message: impl Into<String>) {
        self.record(LogLevel::Warn, step, message);
    }

    pub fn error(&self, step: &str, message: impl Into<String>) {
        self.record(LogLevel::Error, step, message);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Whether any entry for `step` contains `needle`.
    pub fn contains(&self, step: &str, needle: &str) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|e| e.step == step && e.message.contains(needle))
    }
}

impl Drop for SessionLog {
    fn drop(&mut self) {
        if let Some(writer) = self.file.get_mut().as_mut() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn entries_are_appended_to_a_timestamped_file() {
        let dir = tempfile::tempdir().unwrap();
        let started = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();

        let log = SessionLog::open(dir.path(), started);
        log.info("rollout", "replica 1 healthy at attempt 3");
        log.warn("backup", "log directory missing");
        let path = log.path().unwrap().to_path_buf();
        drop(log);

        assert_eq!(path, dir.path().join("deploy-20240309_140507.log"));
        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[INFO] rollout: replica 1 healthy at attempt 3"));
        assert!(lines[1].contains("[WARN] backup"));
    }

    #[test]
    fn unwritable_directory_degrades_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("logs");
        std::fs::write(&blocker, "not a directory").unwrap();

        let log = SessionLog::open(&blocker, Utc::now());
        assert!(log.path().is_none());
        log.error("verify", "smoke request refused");
        assert!(log.contains("verify", "refused"));
    }
}
