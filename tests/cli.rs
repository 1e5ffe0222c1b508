// ABOUTME: Integration tests for the stagehand CLI commands.
// ABOUTME: Validates --help output, argument errors and preflight aborts.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

const MANIFEST: &str = r#"
stack: shop
primary:
  name: api
  image: ghcr.io/acme/api
health:
  endpoint: http://127.0.0.1:9/health
"#;

fn stagehand_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("stagehand"))
}

fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("stagehand.yml"), MANIFEST).unwrap();
    fs::create_dir_all(dir.path().join("config")).unwrap();
    dir
}

fn has_entries(path: &Path) -> bool {
    fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_some())
}

#[test]
fn help_shows_commands() {
    stagehand_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("rollback"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn deploy_requires_a_version() {
    stagehand_cmd()
        .arg("deploy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<VERSION>"));
}

#[test]
fn missing_manifest_is_reported() {
    let dir = tempfile::tempdir().unwrap();

    stagehand_cmd()
        .current_dir(dir.path())
        .args(["deploy", "v1.2.3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("manifest not found"));
}

#[test]
fn invalid_version_is_rejected_before_anything_runs() {
    let dir = project();

    stagehand_cmd()
        .current_dir(dir.path())
        .args(["deploy", ".v1", "--non-interactive"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid version"));

    assert!(!dir.path().join("backups").exists());
}

#[test]
fn missing_environment_file_aborts_in_preflight() {
    let dir = project();

    stagehand_cmd()
        .current_dir(dir.path())
        .args(["deploy", "v1.2.3", "staging", "--non-interactive"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("preflight check"))
        .stderr(predicate::str::contains("environment file"));

    assert!(!has_entries(&dir.path().join("backups")));
}

#[test]
fn json_mode_reports_errors_as_events() {
    let dir = project();

    stagehand_cmd()
        .current_dir(dir.path())
        .args(["--json", "deploy", "bad version"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(r#""event":"error""#));
}

#[test]
fn rollback_prompt_declines_on_end_of_input() {
    let dir = project();

    stagehand_cmd()
        .current_dir(dir.path())
        .args(["rollback", "staging"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("rollback cancelled"));
}
