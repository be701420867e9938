use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::core::archiver::Archiver;
use crate::core::dependencies::ensure_available;
use crate::core::models::{ArchiveResult, BackupRequest, Destination, TransferResult};
use crate::core::transporter::Transporter;
use crate::error::BackupError;

/// Inputs for one backup run, before validation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub destination: String,
    pub source: PathBuf,
    pub exclude_patterns: Vec<String>,
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub archive: ArchiveResult,
    pub transfer: TransferResult,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Owns the local archive from the moment it exists and deletes it when
/// released or dropped.
#[derive(Debug)]
pub struct ArchiveGuard {
    path: Option<PathBuf>,
}

impl ArchiveGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or(Path::new(""))
    }

    /// Delete the archive now, reporting any failure.
    pub fn release(mut self) -> io::Result<()> {
        match self.path.take() {
            Some(path) => remove_archive(&path),
            None => Ok(()),
        }
    }
}

impl Drop for ArchiveGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = remove_archive(&path) {
                warn!(archive = %path.display(), error = %e, "Failed to remove temporary archive");
            }
        }
    }
}

fn remove_archive(path: &Path) -> io::Result<()> {
    debug!(archive = %path.display(), "Removing temporary archive");
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// What a run would do, printed by `--preview`.
#[derive(Debug, Clone)]
pub struct PreviewSummary {
    pub source: PathBuf,
    pub destination: Destination,
}

impl PreviewSummary {
    pub fn new(source: impl Into<PathBuf>, destination: &str) -> Result<Self, BackupError> {
        Ok(Self {
            source: source.into(),
            destination: destination.parse()?,
        })
    }

    pub fn lines(&self) -> Vec<String> {
        vec![
            "Preview summary:".to_string(),
            "---------------".to_string(),
            format!("Source: {}", self.source.display()),
            format!("Destination: {}", self.destination),
            "This would:".to_string(),
            format!("1. Create backup archive of: {}", self.source.display()),
            format!("2. Upload to: {}", self.destination),
            "3. Clean up temporary files".to_string(),
        ]
    }
}

impl fmt::Display for PreviewSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Sequences archive, upload and cleanup for a single run.
pub struct Orchestrator {
    run_id: Uuid,
    archiver: Arc<dyn Archiver>,
    transporter: Arc<dyn Transporter>,
}

impl Orchestrator {
    pub fn new(
        run_id: Uuid,
        archiver: Arc<dyn Archiver>,
        transporter: Arc<dyn Transporter>,
    ) -> Self {
        Self {
            run_id,
            archiver,
            transporter,
        }
    }

    pub async fn run(&self, options: RunOptions) -> Result<RunSummary, BackupError> {
        let span = info_span!("backup", run_id = %self.run_id);
        self.run_inner(options).instrument(span).await
    }

    async fn run_inner(&self, options: RunOptions) -> Result<RunSummary, BackupError> {
        let started_at = Utc::now();

        let destination: Destination = options.destination.parse()?;
        let request = BackupRequest::new(options.source, options.exclude_patterns, options.verbose)?;

        let mut programs = self.archiver.required_programs();
        programs.extend(self.transporter.required_programs());
        ensure_available(&programs)?;

        debug!(archive = %self.archiver.archive_path().display(), "Writing archive");
        let archive = self.archiver.run(&request).await?;
        let guard = ArchiveGuard::new(archive.archive_path.clone());

        let transfer = self.transporter.run(guard.path(), &destination).await;

        info!("Cleaning up temporary files");
        if let Err(e) = guard.release() {
            warn!(archive = %archive.archive_path.display(), error = %e, "Failed to remove temporary archive");
        }

        let transfer = transfer?;
        let finished_at = Utc::now();

        info!(
            run_id = %self.run_id,
            elapsed_secs = (finished_at - started_at).num_seconds(),
            "Backup completed successfully!"
        );

        Ok(RunSummary {
            run_id: self.run_id,
            archive,
            transfer,
            started_at,
            finished_at,
        })
    }
}
