//! CLI integration tests for backup-home.
//!
//! These run the built binary with `HOME` and the temp directory pointed at
//! scratch directories, and check exit codes and output. None of them reach
//! the archiving stage, so no external tools are needed.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::{TempDir, tempdir};

struct Sandbox {
    home: TempDir,
    tmp: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            home: tempdir().unwrap(),
            tmp: tempdir().unwrap(),
        }
    }

    /// Get a command for the backup-home binary, isolated from the real
    /// home directory, temp directory and configuration.
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("backup-home").unwrap();
        cmd.env("HOME", self.home.path())
            .env("TMPDIR", self.tmp.path())
            .env("TEMP", self.tmp.path())
            .env("TMP", self.tmp.path())
            .env_remove("RUST_LOG");
        cmd
    }

    fn source(&self) -> &Path {
        self.home.path()
    }

    fn tmp_is_empty(&self) -> bool {
        std::fs::read_dir(self.tmp.path()).unwrap().next().is_none()
    }
}

// =============================================================================
// Help and usage
// =============================================================================

#[test]
fn no_arguments_prints_help_and_fails() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn help_flag_succeeds() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--preview"))
        .stdout(predicate::str::contains("gdrive:backup/home"));
}

// =============================================================================
// Preview
// =============================================================================

#[test]
fn preview_prints_plan_and_touches_nothing() {
    let sandbox = Sandbox::new();
    let source = sandbox.source().display().to_string();

    sandbox
        .cmd()
        .args(["--preview", "--source", &source, "gdrive:backup/home"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Preview summary:"))
        .stdout(predicate::str::contains(format!("Source: {source}")))
        .stdout(predicate::str::contains("Destination: gdrive:backup/home"))
        .stdout(predicate::str::contains(format!(
            "1. Create backup archive of: {source}"
        )))
        .stdout(predicate::str::contains("2. Upload to: gdrive:backup/home"))
        .stdout(predicate::str::contains("3. Clean up temporary files"));

    assert!(sandbox.tmp_is_empty(), "preview must not write an archive");
}

#[test]
fn preview_is_printed_when_logging_is_quiet() {
    let sandbox = Sandbox::new();
    let source = sandbox.source().display().to_string();

    sandbox
        .cmd()
        .env("RUST_LOG", "warn")
        .args(["--preview", "-s", &source, "drive:"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3. Clean up temporary files"));
}

#[test]
fn preview_rejects_destination_without_backend() {
    let sandbox = Sandbox::new();
    let source = sandbox.source().display().to_string();

    sandbox
        .cmd()
        .args(["--preview", "--source", &source, "nocolon"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Preview summary:").not());
}

// =============================================================================
// Failures exit with code 1
// =============================================================================

#[test]
fn destination_without_colon_exits_1() {
    let sandbox = Sandbox::new();
    let source = sandbox.source().display().to_string();

    sandbox
        .cmd()
        .args(["--source", &source, "gdrive/backup"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Error:"));

    assert!(sandbox.tmp_is_empty());
}

#[test]
fn missing_source_exits_1_without_archive() {
    let sandbox = Sandbox::new();
    let missing = sandbox.home.path().join("missing").display().to_string();

    sandbox
        .cmd()
        .args(["--source", &missing, "drive:"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Error:"));

    assert!(sandbox.tmp_is_empty());
}

#[test]
fn explicit_missing_config_file_exits_1() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .args(["--config", "/nonexistent/backup-home.toml", "drive:"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does not exist"));
}
