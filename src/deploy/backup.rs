// ABOUTME: Point-in-time backups taken before anything is changed.
// ABOUTME: Data store snapshot, configuration archive and log archive, plus the `latest` pointer.

use super::error::DeployError;
use super::log::SessionLog;
use super::plan::ReleasePlan;
use crate::diagnostics::Warning;
use crate::runtime::{ArchiveOps, ContainerFilters, ContainerOps, ExecConfig, ExecOps, labels};
use crate::types::ContainerId;
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

const STEP: &str = "backup";
const RECORD_FILE: &str = "record.json";
const LATEST_POINTER: &str = "latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupArtifact {
    DatastoreSnapshot,
    ConfigArchive,
    LogArchive,
}

impl BackupArtifact {
    pub fn file_name(self) -> &'static str {
        match self {
            BackupArtifact::DatastoreSnapshot => "dump.rdb",
            BackupArtifact::ConfigArchive => "config.tar.gz",
            BackupArtifact::LogArchive => "logs.tar.gz",
        }
    }
}

/// Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    id: String,
    created_at: DateTime<Utc>,
    artifacts: Vec<BackupArtifact>,
    previous_version: Option<String>,
}

impl BackupRecord {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn artifacts(&self) -> &[BackupArtifact] {
        &self.artifacts
    }

    pub fn has(&self, artifact: BackupArtifact) -> bool {
        self.artifacts.contains(&artifact)
    }

    /// Version of the primary service that was running when the backup was taken.
    pub fn previous_version(&self) -> Option<&str> {
        self.previous_version.as_deref()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt backup record {path}: {source}")]
    Record {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> BackupError + '_ {
    move |source| BackupError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Backup directory layout: one directory per record plus a `latest` pointer file.
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    pub fn artifact_path(&self, record: &BackupRecord, artifact: BackupArtifact) -> PathBuf {
        self.dir(&record.id).join(artifact.file_name())
    }

    /// Reserve a fresh record directory named after `now`. Backups taken
    /// within the same second get a numeric suffix.
    pub fn allocate(&self, now: DateTime<Utc>) -> Result<(String, PathBuf), BackupError> {
        std::fs::create_dir_all(&self.root).map_err(io_err(&self.root))?;
        let base = now.format("%Y%m%d_%H%M%S").to_string();

        let mut suffix = 0u32;
        loop {
            let id = match suffix {
                0 => base.clone(),
                n => format!("{base}-{n}"),
            };
            let dir = self.dir(&id);
            match std::fs::create_dir(&dir) {
                Ok(()) => return Ok((id, dir)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(io_err(&dir)(e)),
            }
        }
    }

    pub fn write_record(&self, record: &BackupRecord) -> Result<(), BackupError> {
        let path = self.dir(&record.id).join(RECORD_FILE);
        let json = serde_json::to_vec_pretty(record).map_err(|source| BackupError::Record {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, json).map_err(io_err(&path))
    }

    /// Point `latest` at a record. Written to a temp file and renamed.
    pub fn set_latest(&self, id: &str) -> Result<(), BackupError> {
        let pointer = self.root.join(LATEST_POINTER);
        let staging = self.root.join(format!(".{LATEST_POINTER}.tmp"));
        std::fs::write(&staging, id).map_err(io_err(&staging))?;
        std::fs::rename(&staging, &pointer).map_err(io_err(&pointer))
    }

    /// The record `latest` points at, if any.
    pub fn latest(&self) -> Result<Option<BackupRecord>, BackupError> {
        let pointer = self.root.join(LATEST_POINTER);
        let id = match std::fs::read_to_string(&pointer) {
            Ok(id) => id.trim().to_string(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&pointer)(e)),
        };

        let path = self.dir(&id).join(RECORD_FILE);
        let bytes = std::fs::read(&path).map_err(io_err(&path))?;
        let record = serde_json::from_slice(&bytes)
            .map_err(|source| BackupError::Record { path, source })?;
        Ok(Some(record))
    }
}

/// Gzipped tar of a directory's contents.
pub(crate) fn archive_dir(src: &Path, dest: &Path) -> io::Result<()> {
    let file = File::create(dest)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.append_dir_all(".", src)?;
    builder.into_inner()?.finish()?;
    Ok(())
}

/// Extract a gzipped tar into `dest`, overwriting existing files.
pub(crate) fn extract_archive(archive: &Path, dest: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dest)?;
    let file = File::open(archive)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.set_overwrite(true);
    archive.unpack(dest)
}

/// Write the first regular file of a tar stream to `dest`.
fn write_first_file(tar_bytes: &[u8], dest: &Path) -> io::Result<()> {
    let mut archive = tar::Archive::new(tar_bytes);
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type().is_file() {
            let mut out = File::create(dest)?;
            io::copy(&mut entry, &mut out)?;
            return Ok(());
        }
    }
    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        "copy returned no file",
    ))
}

async fn blocking<F>(f: F) -> Result<(), String>
where
    F: FnOnce() -> io::Result<()> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(format!("archive task failed: {e}")),
    }
}

enum SubStep {
    Captured(BackupArtifact),
    Skipped(String),
    Failed(String),
}

pub struct BackupManager<'a, R: ContainerOps + ExecOps + ArchiveOps> {
    runtime: &'a R,
    plan: &'a ReleasePlan,
    store: BackupStore,
    log: &'a SessionLog,
}

impl<'a, R: ContainerOps + ExecOps + ArchiveOps> BackupManager<'a, R> {
    pub fn new(runtime: &'a R, plan: &'a ReleasePlan, log: &'a SessionLog) -> Self {
        Self {
            runtime,
            plan,
            store: BackupStore::new(plan.manifest.backup_dir()),
            log,
        }
    }

    /// Capture every artifact that exists. Fails only when every attempted
    /// sub-step failed; partial failures come back as warnings.
    pub async fn snapshot(&self) -> Result<(BackupRecord, Vec<Warning>), DeployError> {
        let (id, dir) = self
            .store
            .allocate(Utc::now())
            .map_err(|e| DeployError::Backup(e.to_string()))?;
        self.log.info(STEP, format!("writing backup {id}"));

        let results = [
            ("data store snapshot", self.snapshot_datastore(&dir).await),
            ("configuration archive", self.archive_config(&dir).await),
            ("log archive", self.archive_logs(&dir).await),
        ];

        let mut artifacts = Vec::new();
        let mut failures = Vec::new();
        for (what, result) in results {
            match result {
                SubStep::Captured(artifact) => {
                    self.log.info(STEP, format!("{what} captured"));
                    artifacts.push(artifact);
                }
                SubStep::Skipped(reason) => self.log.info(STEP, format!("{what} skipped: {reason}")),
                SubStep::Failed(reason) => {
                    self.log.warn(STEP, format!("{what} failed: {reason}"));
                    failures.push(format!("{what}: {reason}"));
                }
            }
        }

        if artifacts.is_empty() && !failures.is_empty() {
            return Err(DeployError::Backup(failures.join("; ")));
        }

        let record = BackupRecord {
            id: id.clone(),
            created_at: Utc::now(),
            artifacts,
            previous_version: self.running_version().await,
        };
        self.store
            .write_record(&record)
            .and_then(|()| self.store.set_latest(&id))
            .map_err(|e| DeployError::Backup(e.to_string()))?;
        self.log.info(
            STEP,
            format!("backup {id} recorded as latest in {}", dir.display()),
        );

        let warnings = failures
            .into_iter()
            .map(|f| Warning::from_error(&DeployError::BackupPartialFailure(f)))
            .collect();
        Ok((record, warnings))
    }

    async fn snapshot_datastore(&self, dir: &Path) -> SubStep {
        let Some(ref datastore) = self.plan.manifest.datastore else {
            return SubStep::Skipped("no data store declared".to_string());
        };
        let container = ContainerId::new(datastore.container.clone());

        match self.runtime.inspect_container(&container).await {
            Ok(info) if info.state.is_running() => {}
            Ok(info) => return SubStep::Skipped(format!("{} is {}", container, info.state)),
            Err(e) if e.is_absent() => return SubStep::Skipped(format!("{container} not found")),
            Err(e) => return SubStep::Failed(e.to_string()),
        }

        let flush = ExecConfig::command(datastore.flush_command.iter().cloned());
        match self.runtime.exec(&container, &flush).await {
            Ok(result) if result.success() => {}
            Ok(result) => {
                return SubStep::Failed(format!(
                    "flush exited with code {}",
                    result.exit_code
                ));
            }
            Err(e) => return SubStep::Failed(e.to_string()),
        }
        tokio::time::sleep(datastore.flush_wait).await;

        let bytes = match self
            .runtime
            .copy_from_container(&container, &datastore.snapshot_path)
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => return SubStep::Failed(e.to_string()),
        };

        let artifact = BackupArtifact::DatastoreSnapshot;
        let dest = dir.join(artifact.file_name());
        match blocking(move || write_first_file(&bytes, &dest)).await {
            Ok(()) => SubStep::Captured(artifact),
            Err(e) => SubStep::Failed(e),
        }
    }

    async fn archive_config(&self, dir: &Path) -> SubStep {
        let src = self.plan.manifest.config_dir();
        if !src.is_dir() {
            return SubStep::Failed(format!("{} is not a directory", src.display()));
        }
        let artifact = BackupArtifact::ConfigArchive;
        let dest = dir.join(artifact.file_name());
        match blocking(move || archive_dir(&src, &dest)).await {
            Ok(()) => SubStep::Captured(artifact),
            Err(e) => SubStep::Failed(e),
        }
    }

    async fn archive_logs(&self, dir: &Path) -> SubStep {
        let src = self.plan.manifest.log_dir();
        if !src.is_dir() {
            return SubStep::Skipped(format!("{} does not exist", src.display()));
        }
        let artifact = BackupArtifact::LogArchive;
        let dest = dir.join(artifact.file_name());
        match blocking(move || archive_dir(&src, &dest)).await {
            Ok(()) => SubStep::Captured(artifact),
            Err(e) => SubStep::Failed(e),
        }
    }

    /// Version label of a running primary replica.
    async fn running_version(&self) -> Option<String> {
        let manifest = &self.plan.manifest;
        let filters =
            ContainerFilters::for_service(manifest.stack.as_str(), manifest.primary.name.as_str(), false);
        match self.runtime.list_containers(&filters).await {
            Ok(containers) => containers
                .iter()
                .find(|c| {
                    c.labels.get(labels::ROLE).map(String::as_str) == Some(super::plan::ROLE_PRIMARY)
                })
                .and_then(|c| c.labels.get(labels::VERSION).cloned()),
            Err(e) => {
                self.log.warn(STEP, format!("cannot read running version: {e}"));
                None
            }
        }
    }
}
