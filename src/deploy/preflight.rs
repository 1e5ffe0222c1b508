// ABOUTME: Preflight validation run before anything on the host is changed.
// ABOUTME: Checks the runtime, tooling, disk space, environment file and credential.

use super::error::{CheckFailure, DeployError, PreflightCheck};
use super::log::SessionLog;
use crate::config::{ConfigError, EnvFile, Manifest};
use crate::runtime::RuntimeInfo;
use async_trait::async_trait;
use nonempty::NonEmpty;
use std::io;
use std::path::{Path, PathBuf};

const STEP: &str = "preflight";
const GIB: u64 = 1024 * 1024 * 1024;

/// Host facts preflight depends on.
#[async_trait]
pub trait HostInspector: Send + Sync {
    /// Free bytes on the filesystem holding `path`.
    async fn free_space(&self, path: &Path) -> io::Result<u64>;

    /// Full path of an executable on PATH.
    fn locate_tool(&self, name: &str) -> Option<PathBuf>;
}

/// Inspects the machine stagehand runs on.
pub struct LocalHost;

#[async_trait]
impl HostInspector for LocalHost {
    async fn free_space(&self, path: &Path) -> io::Result<u64> {
        let output = tokio::process::Command::new("df")
            .arg("-Pk")
            .arg(path)
            .output()
            .await?;

        if !output.status.success() {
            return Err(io::Error::other(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        parse_df_available(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| io::Error::other("unexpected df output"))
    }

    fn locate_tool(&self, name: &str) -> Option<PathBuf> {
        let path = std::env::var_os("PATH")?;
        std::env::split_paths(&path)
            .map(|dir| dir.join(name))
            .find(|candidate| is_executable(candidate))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Available bytes from POSIX `df -Pk` output.
fn parse_df_available(output: &str) -> Option<u64> {
    let line = output.lines().nth(1)?;
    let kib: u64 = line.split_whitespace().nth(3)?.parse().ok()?;
    Some(kib.saturating_mul(1024))
}

type CheckResult = Result<String, CheckFailure>;

fn failed(check: PreflightCheck, message: impl Into<String>) -> CheckFailure {
    CheckFailure {
        check,
        message: message.into(),
    }
}

pub struct PreflightValidator<'a, R: RuntimeInfo> {
    /// The connected runtime, or why connecting failed.
    runtime: Result<&'a R, String>,
    host: &'a dyn HostInspector,
    log: &'a SessionLog,
}

impl<'a, R: RuntimeInfo> PreflightValidator<'a, R> {
    pub fn new(runtime: &'a R, host: &'a dyn HostInspector, log: &'a SessionLog) -> Self {
        Self {
            runtime: Ok(runtime),
            host,
            log,
        }
    }

    /// Validator for a host where connecting to the runtime already failed.
    /// The runtime check fails with `reason`; the other checks still run.
    pub fn unreachable(
        reason: impl Into<String>,
        host: &'a dyn HostInspector,
        log: &'a SessionLog,
    ) -> Self {
        Self {
            runtime: Err(reason.into()),
            host,
            log,
        }
    }

    /// Evaluate every check. The error names every check that failed.
    pub async fn run(
        &self,
        manifest: &Manifest,
        env: &Result<EnvFile, ConfigError>,
    ) -> Result<(), DeployError> {
        let results = [
            self.check_runtime().await,
            self.check_tool(manifest),
            self.check_disk(manifest).await,
            check_env_file(env),
            check_credential(manifest, env),
        ];

        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(detail) => self.log.debug(STEP, detail),
                Err(failure) => {
                    self.log.error(STEP, failure.to_string());
                    failures.push(failure);
                }
            }
        }

        match NonEmpty::from_vec(failures) {
            Some(failures) => Err(DeployError::Validation { failures }),
            None => {
                self.log.info(STEP, "all preflight checks passed");
                Ok(())
            }
        }
    }

    async fn check_runtime(&self) -> CheckResult {
        let runtime = match &self.runtime {
            Ok(runtime) => *runtime,
            Err(reason) => return Err(failed(PreflightCheck::Runtime, reason.clone())),
        };
        runtime
            .ping()
            .await
            .map(|()| "container runtime is responding".to_string())
            .map_err(|e| failed(PreflightCheck::Runtime, e.to_string()))
    }

    fn check_tool(&self, manifest: &Manifest) -> CheckResult {
        let tool = &manifest.preflight.tool;
        match self.host.locate_tool(tool) {
            Some(path) => Ok(format!("{tool} found at {}", path.display())),
            None => Err(failed(
                PreflightCheck::OrchestrationTool,
                format!("{tool} not found on PATH"),
            )),
        }
    }

    async fn check_disk(&self, manifest: &Manifest) -> CheckResult {
        let root = if manifest.root.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            manifest.root.clone()
        };
        let required = manifest.preflight.min_free_disk_gib.saturating_mul(GIB);

        let free = self.host.free_space(&root).await.map_err(|e| {
            failed(
                PreflightCheck::DiskSpace,
                format!("cannot read free space of {}: {e}", root.display()),
            )
        })?;

        if free < required {
            return Err(failed(
                PreflightCheck::DiskSpace,
                format!(
                    "{} GiB free, {} GiB required",
                    free / GIB,
                    manifest.preflight.min_free_disk_gib
                ),
            ));
        }
        Ok(format!("{} GiB free", free / GIB))
    }
}

fn check_env_file(env: &Result<EnvFile, ConfigError>) -> CheckResult {
    match env {
        Ok(env) => Ok(format!("loaded {}", env.path().display())),
        Err(e) => Err(failed(PreflightCheck::EnvironmentFile, e.to_string())),
    }
}

fn check_credential(manifest: &Manifest, env: &Result<EnvFile, ConfigError>) -> CheckResult {
    let key = &manifest.preflight.credential_key;
    let Ok(env) = env else {
        return Err(failed(
            PreflightCheck::Credential,
            format!("{key} unavailable without an environment file"),
        ));
    };
    env.require(key)
        .map(|_| format!("{key} is set"))
        .map_err(|e| failed(PreflightCheck::Credential, e.to_string()))
}


#[cfg(test)]
mod tests {
    use super::testing::StaticHost;
    use super::*;
    use crate::deploy::DeployErrorKind;
    use crate::runtime::fake::ScriptedRuntime;
    use std::collections::HashMap;

    fn manifest() -> Manifest {
        Manifest::from_yaml(
            r#"
stack: shop
primary:
  name: api
  image: ghcr.io/acme/api
health:
  endpoint: http://localhost:8000/health
"#,
        )
        .unwrap()
    }

    fn env_with(key: &str) -> Result<EnvFile, ConfigError> {
        Ok(EnvFile::from_values(HashMap::from([(
            key.to_string(),
            "secret".to_string(),
        )])))
    }

    #[tokio::test]
    async fn passes_when_everything_is_present() {
        let runtime = ScriptedRuntime::new();
        let host = StaticHost::roomy();
        let log = SessionLog::in_memory();

        PreflightValidator::new(&runtime, &host, &log)
            .run(&manifest(), &env_with("API_KEY"))
            .await
            .unwrap();
        assert!(log.contains(STEP, "all preflight checks passed"));
    }

    #[tokio::test]
    async fn missing_environment_file_is_a_validation_error() {
        let runtime = ScriptedRuntime::new();
        let host = StaticHost::roomy();
        let log = SessionLog::in_memory();
        let env = Err(ConfigError::EnvFileMissing(PathBuf::from(".env.staging")));

        let err = PreflightValidator::new(&runtime, &host, &log)
            .run(&manifest(), &env)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), DeployErrorKind::Validation);
        assert_eq!(
            err.failed_checks(),
            vec![PreflightCheck::EnvironmentFile, PreflightCheck::Credential]
        );
        assert!(log.contains(STEP, "credential"));
    }

    #[tokio::test]
    async fn low_disk_space_fails() {
        let runtime = ScriptedRuntime::new();
        let host = StaticHost {
            free_bytes: 2 * GIB,
            tools: vec!["docker".to_string()],
        };
        let log = SessionLog::in_memory();

        let err = PreflightValidator::new(&runtime, &host, &log)
            .run(&manifest(), &env_with("API_KEY"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("2 GiB free, 5 GiB required"));
    }

    #[tokio::test]
    async fn every_failing_check_is_named() {
        let runtime = ScriptedRuntime::new();
        runtime.fail_ping();
        let host = StaticHost {
            free_bytes: 100 * GIB,
            tools: vec![],
        };
        let log = SessionLog::in_memory();

        let err = PreflightValidator::new(&runtime, &host, &log)
            .run(&manifest(), &env_with("OTHER"))
            .await
            .unwrap_err();
        assert_eq!(
            err.failed_checks(),
            vec![
                PreflightCheck::Runtime,
                PreflightCheck::OrchestrationTool,
                PreflightCheck::Credential
            ]
        );
        assert!(err.to_string().contains("docker not found on PATH"));
        assert!(log.contains(STEP, "API_KEY"));
    }

    #[tokio::test]
    async fn failed_connection_still_runs_the_host_checks() {
        let host = StaticHost::roomy();
        let log = SessionLog::in_memory();
        let env = Err(ConfigError::EnvFileMissing(PathBuf::from(".env.staging")));

        let err = PreflightValidator::<ScriptedRuntime>::unreachable(
            "no container runtime found",
            &host,
            &log,
        )
        .run(&manifest(), &env)
        .await
        .unwrap_err();

        assert_eq!(
            err.failed_checks(),
            vec![
                PreflightCheck::Runtime,
                PreflightCheck::EnvironmentFile,
                PreflightCheck::Credential
            ]
        );
        let message = err.to_string();
        assert!(message.contains("no container runtime found"));
        assert!(message.contains("environment file"));
    }

    #[tokio::test]
    async fn huge_disk_threshold_does_not_overflow() {
        let runtime = ScriptedRuntime::new();
        let host = StaticHost::roomy();
        let log = SessionLog::in_memory();
        let mut manifest = manifest();
        manifest.preflight.min_free_disk_gib = u64::MAX;

        let err = PreflightValidator::new(&runtime, &host, &log)
            .run(&manifest, &env_with("API_KEY"))
            .await
            .unwrap_err();
        assert_eq!(err.failed_checks(), vec![PreflightCheck::DiskSpace]);
    }

    #[test]
    fn df_output_is_parsed_in_bytes() {
        let out = "Filesystem 1024-blocks Used Available Capacity Mounted on\n\
                   /dev/sda1 102400 51200 51200 50% /\n";
        assert_eq!(parse_df_available(out), Some(51200 * 1024));
        assert_eq!(parse_df_available("garbage"), None);
    }
}
