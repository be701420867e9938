mod combined;
mod piped;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use combined::{CombinedArchiver, ToolOutcome};
pub use piped::{PackerInvocation, PipedArchiver};

use crate::core::models::{ArchiveResult, BackupRequest};
use crate::core::progress::ProgressSink;
use crate::error::ArchiveError;

/// Builds the local archive of a source directory.
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Executables that must be on the search path before `run` is called.
    fn required_programs(&self) -> Vec<String>;

    /// Where the archive will be written.
    fn archive_path(&self) -> PathBuf;

    async fn run(&self, request: &BackupRequest) -> Result<ArchiveResult, ArchiveError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ArchiverKind {
    /// tar piped into a parallel compressor.
    Piped,
    /// A single 7-Zip invocation writing an uncompressed zip.
    Combined,
}

impl ArchiverKind {
    pub fn detect() -> Self {
        if cfg!(windows) {
            Self::Combined
        } else {
            Self::Piped
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Piped => "tar.gz",
            Self::Combined => "zip",
        }
    }
}

/// Program names for the external tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub tar: String,
    pub compressor: String,
    pub sevenzip: String,
    pub rclone: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            tar: "tar".to_string(),
            compressor: "pigz".to_string(),
            sevenzip: "7z".to_string(),
            rclone: "rclone".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArchiverSettings {
    pub archive_path: PathBuf,
    pub tools: ToolPaths,
    pub compressor_threads: Option<usize>,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub max_interrupt_retries: u32,
}

pub fn create_archiver(
    kind: ArchiverKind,
    settings: &ArchiverSettings,
    sink: Arc<dyn ProgressSink>,
) -> Box<dyn Archiver> {
    match kind {
        ArchiverKind::Piped => Box::new(PipedArchiver::new(settings, sink)),
        ArchiverKind::Combined => Box::new(CombinedArchiver::new(settings, sink)),
    }
}

/// Run `attempt` again from scratch whenever it reports an interrupted wait,
/// at most `max_retries` extra times.
pub(crate) async fn retry_interrupted<F, Fut, T>(
    max_retries: u32,
    mut attempt: F,
) -> Result<T, ArchiveError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ArchiveError>>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match attempt().await {
            Err(ArchiveError::Interrupted(e)) if attempts <= max_retries => {
                warn!(attempt = attempts, error = %e, "Backup was interrupted, retrying");
            }
            Err(ArchiveError::Interrupted(_)) => {
                return Err(ArchiveError::RetriesExhausted { attempts });
            }
            result => return result,
        }
    }
}

/// Best-effort removal of a partial archive.
pub(crate) async fn remove_partial(path: &std::path::Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(archive = %path.display(), error = %e, "Failed to remove partial archive"),
    }
}
