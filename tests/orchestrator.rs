//! Orchestrator tests with stand-in stages.
//!
//! The archiver and transporter here record how often they were invoked, so
//! the tests can check sequencing and cleanup without external tools.

use async_trait::async_trait;
use backup_home::core::{
    ArchiveResult, Archiver, BackupRequest, Destination, Orchestrator, RunOptions,
    TransferResult, Transporter,
};
use backup_home::error::{
    ArchiveError, BackupError, ExitDescription, FailureKind, TransferError,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::tempdir;
use uuid::Uuid;

#[derive(Clone, Copy)]
enum ArchiveBehavior {
    Succeed,
    Fail,
}

struct SpyArchiver {
    archive_path: PathBuf,
    behavior: ArchiveBehavior,
    calls: AtomicUsize,
    required: Vec<String>,
}

impl SpyArchiver {
    fn new(archive_path: PathBuf, behavior: ArchiveBehavior) -> Self {
        Self {
            archive_path,
            behavior,
            calls: AtomicUsize::new(0),
            required: Vec::new(),
        }
    }
}

#[async_trait]
impl Archiver for SpyArchiver {
    fn required_programs(&self) -> Vec<String> {
        self.required.clone()
    }

    fn archive_path(&self) -> PathBuf {
        self.archive_path.clone()
    }

    async fn run(&self, _request: &BackupRequest) -> Result<ArchiveResult, ArchiveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            ArchiveBehavior::Succeed => {
                std::fs::write(&self.archive_path, b"archive bytes").unwrap();
                Ok(ArchiveResult {
                    archive_path: self.archive_path.clone(),
                    size_bytes: 13,
                    elapsed: Duration::from_millis(5),
                })
            }
            ArchiveBehavior::Fail => Err(ArchiveError::CompressionFailed {
                program: "pigz".to_string(),
                status: ExitDescription { code: Some(1) },
            }),
        }
    }
}

struct SpyTransporter {
    succeed: bool,
    calls: AtomicUsize,
    /// Whether the archive existed when the upload started.
    saw_archive: Mutex<Option<bool>>,
}

impl SpyTransporter {
    fn new(succeed: bool) -> Self {
        Self {
            succeed,
            calls: AtomicUsize::new(0),
            saw_archive: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Transporter for SpyTransporter {
    fn required_programs(&self) -> Vec<String> {
        Vec::new()
    }

    async fn run(
        &self,
        archive: &Path,
        _destination: &Destination,
    ) -> Result<TransferResult, TransferError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.saw_archive.lock().unwrap() = Some(archive.exists());

        if self.succeed {
            Ok(TransferResult {
                bytes_transferred: 13,
                elapsed: Duration::from_millis(5),
            })
        } else {
            Err(TransferError::Failed {
                program: "rclone".to_string(),
                status: ExitDescription { code: Some(1) },
            })
        }
    }
}

fn options(destination: &str, source: &Path) -> RunOptions {
    RunOptions {
        destination: destination.to_string(),
        source: source.to_path_buf(),
        exclude_patterns: vec!["*.log".to_string()],
        verbose: false,
    }
}

fn orchestrator(
    archiver: Arc<SpyArchiver>,
    transporter: Arc<SpyTransporter>,
) -> Orchestrator {
    Orchestrator::new(Uuid::now_v7(), archiver, transporter)
}

#[tokio::test]
async fn destination_without_colon_spawns_nothing() {
    let temp = tempdir().unwrap();
    let archiver = Arc::new(SpyArchiver::new(
        temp.path().join("user.tar.gz"),
        ArchiveBehavior::Succeed,
    ));
    let transporter = Arc::new(SpyTransporter::new(true));

    for destination in ["drive", "gdrive/backup", ""] {
        let err = orchestrator(archiver.clone(), transporter.clone())
            .run(options(destination, temp.path()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Validation);
    }

    assert_eq!(archiver.calls.load(Ordering::SeqCst), 0);
    assert_eq!(transporter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_source_spawns_nothing() {
    let temp = tempdir().unwrap();
    let archiver = Arc::new(SpyArchiver::new(
        temp.path().join("user.tar.gz"),
        ArchiveBehavior::Succeed,
    ));
    let transporter = Arc::new(SpyTransporter::new(true));

    let err = orchestrator(archiver.clone(), transporter.clone())
        .run(options("drive:", &temp.path().join("missing")))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Validation);
    assert_eq!(archiver.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_dependency_stops_before_archiving() {
    let temp = tempdir().unwrap();
    let mut spy = SpyArchiver::new(temp.path().join("user.tar.gz"), ArchiveBehavior::Succeed);
    spy.required = vec!["backup-home-no-such-packer".to_string()];
    let archiver = Arc::new(spy);
    let transporter = Arc::new(SpyTransporter::new(true));

    let err = orchestrator(archiver.clone(), transporter.clone())
        .run(options("drive:", temp.path()))
        .await
        .unwrap_err();

    match &err {
        BackupError::DependencyMissing { program } => {
            assert_eq!(program, "backup-home-no-such-packer")
        }
        other => panic!("expected DependencyMissing, got {other:?}"),
    }
    assert_eq!(archiver.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn archive_is_removed_after_successful_upload() {
    let temp = tempdir().unwrap();
    let source = temp.path().join("home");
    std::fs::create_dir_all(&source).unwrap();
    let archive = temp.path().join("user.tar.gz");

    let archiver = Arc::new(SpyArchiver::new(archive.clone(), ArchiveBehavior::Succeed));
    let transporter = Arc::new(SpyTransporter::new(true));

    let summary = orchestrator(archiver.clone(), transporter.clone())
        .run(options("gdrive:backup/home", &source))
        .await
        .expect("run should succeed");

    assert_eq!(summary.archive.archive_path, archive);
    assert_eq!(summary.transfer.bytes_transferred, 13);
    assert!(summary.finished_at >= summary.started_at);
    assert_eq!(*transporter.saw_archive.lock().unwrap(), Some(true));
    assert!(!archive.exists(), "archive should be cleaned up");
}

#[tokio::test]
async fn archive_is_removed_after_failed_upload() {
    let temp = tempdir().unwrap();
    let source = temp.path().join("home");
    std::fs::create_dir_all(&source).unwrap();
    let archive = temp.path().join("user.tar.gz");

    let archiver = Arc::new(SpyArchiver::new(archive.clone(), ArchiveBehavior::Succeed));
    let transporter = Arc::new(SpyTransporter::new(false));

    let err = orchestrator(archiver.clone(), transporter.clone())
        .run(options("drive:", &source))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Transfer);
    assert_eq!(transporter.calls.load(Ordering::SeqCst), 1);
    assert!(!archive.exists(), "archive should be cleaned up");
}

#[tokio::test]
async fn archive_failure_skips_upload() {
    let temp = tempdir().unwrap();
    let archive = temp.path().join("user.tar.gz");

    let archiver = Arc::new(SpyArchiver::new(archive.clone(), ArchiveBehavior::Fail));
    let transporter = Arc::new(SpyTransporter::new(true));

    let err = orchestrator(archiver.clone(), transporter.clone())
        .run(options("drive:", temp.path()))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Archive);
    assert!(err.to_string().contains("compression failed"));
    assert_eq!(archiver.calls.load(Ordering::SeqCst), 1);
    assert_eq!(transporter.calls.load(Ordering::SeqCst), 0);
    assert!(!archive.exists());
}
