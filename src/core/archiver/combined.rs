use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

use super::{Archiver, ArchiverSettings, remove_partial};
use crate::core::models::{ArchiveResult, BackupRequest, format_bytes};
use crate::core::process::{spawn_line_reader, terminate};
use crate::core::progress::{ProgressEvent, ProgressSink, Stage, monitor_file_growth};
use crate::error::{ArchiveError, ExitDescription};

/// The successful exit codes of the archiving tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOutcome {
    /// Exit code 0.
    Clean,
    /// Exit code 1: some files were skipped.
    SkippedFiles,
    /// Exit code 2: files were skipped because they were locked or unreadable.
    LockedFiles,
}

impl ToolOutcome {
    pub fn from_exit(status: ExitDescription) -> Option<Self> {
        match status.code {
            Some(0) => Some(Self::Clean),
            Some(1) => Some(Self::SkippedFiles),
            Some(2) => Some(Self::LockedFiles),
            _ => None,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::Clean => "Archive created successfully with no warnings.",
            Self::SkippedFiles => "Archive created successfully with some files skipped.",
            Self::LockedFiles => {
                "Archive created with some files skipped (locked files or permissions)."
            }
        }
    }
}

/// Single-stage archiver driving 7-Zip in store-only zip mode.
pub struct CombinedArchiver {
    program: String,
    archive_path: PathBuf,
    timeout: Duration,
    poll_interval: Duration,
    sink: Arc<dyn ProgressSink>,
}

impl CombinedArchiver {
    pub fn new(settings: &ArchiverSettings, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            program: settings.tools.sevenzip.clone(),
            archive_path: settings.archive_path.clone(),
            timeout: settings.timeout,
            poll_interval: settings.poll_interval,
            sink,
        }
    }

    pub fn tool_args(&self, request: &BackupRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["a", "-tzip", "-mx=0", "-r", "-y", "-ssw"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(self.archive_path.clone().into_os_string());
        args.push(request.source_directory.join("*").into_os_string());
        for pattern in &request.exclude_patterns {
            args.push(format!("-xr!{pattern}").into());
        }
        args
    }

    async fn archive(&self, request: &BackupRequest) -> Result<ArchiveResult, ArchiveError> {
        let started = Instant::now();

        // 7-Zip adds to an existing archive instead of replacing it.
        remove_partial(&self.archive_path).await;

        let mut child = Command::new(&self.program)
            .args(self.tool_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ArchiveError::Spawn {
                stage: "archiving",
                program: self.program.clone(),
                source,
            })?;

        let stdout_log = child.stdout.take().map(|stdout| {
            let sink = self.sink.clone();
            let verbose = request.verbose;
            spawn_line_reader(stdout, move |line| {
                if verbose {
                    sink.on_progress(ProgressEvent::FileArchived(line));
                }
            })
        });
        let stderr_log = child.stderr.take().map(|stderr| {
            let sink = self.sink.clone();
            spawn_line_reader(stderr, move |line| {
                sink.on_progress(ProgressEvent::ToolMessage {
                    stage: Stage::Archive,
                    message: line,
                });
            })
        });

        let cancel = CancellationToken::new();
        let monitor = tokio::spawn(monitor_file_growth(
            self.archive_path.clone(),
            self.poll_interval,
            self.sink.clone(),
            cancel.clone(),
        ));

        let waited = tokio::time::timeout(self.timeout, child.wait()).await;

        cancel.cancel();
        let _ = monitor.await;

        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                terminate(&mut child, &self.program).await;
                remove_partial(&self.archive_path).await;
                return Err(ArchiveError::io("failed to wait for the archiving tool", e));
            }
            Err(_) => {
                tracing::error!(
                    timeout_secs = self.timeout.as_secs(),
                    "Backup process timed out, stopping archiving tool"
                );
                terminate(&mut child, &self.program).await;
                remove_partial(&self.archive_path).await;
                return Err(ArchiveError::TimedOut(self.timeout));
            }
        };

        for reader in [stdout_log, stderr_log].into_iter().flatten() {
            let _ = reader.await;
        }

        let status = ExitDescription::from(status);
        let Some(outcome) = ToolOutcome::from_exit(status) else {
            remove_partial(&self.archive_path).await;
            return Err(ArchiveError::ToolFailed {
                program: self.program.clone(),
                status,
            });
        };

        match outcome {
            ToolOutcome::Clean => info!("{}", outcome.describe()),
            _ => warn!("{}", outcome.describe()),
        }

        let size_bytes = tokio::fs::metadata(&self.archive_path)
            .await
            .map_err(|_| ArchiveError::MissingOutput(self.archive_path.clone()))?
            .len();

        Ok(ArchiveResult {
            archive_path: self.archive_path.clone(),
            size_bytes,
            elapsed: started.elapsed(),
        })
    }
}

#[async_trait]
impl Archiver for CombinedArchiver {
    fn required_programs(&self) -> Vec<String> {
        vec![self.program.clone()]
    }

    fn archive_path(&self) -> PathBuf {
        self.archive_path.clone()
    }

    async fn run(&self, request: &BackupRequest) -> Result<ArchiveResult, ArchiveError> {
        let span = info_span!(
            "archive",
            source = %request.source_directory.display(),
            archive = %self.archive_path.display()
        );

        async {
            self.sink.on_progress(ProgressEvent::Started {
                stage: Stage::Archive,
                description: format!(
                    "Creating backup of directory: {}",
                    request.source_directory.display()
                ),
            });

            let result = self.archive(request).await?;

            info!(
                size_bytes = result.size_bytes,
                "Backup archive size: {}",
                format_bytes(result.size_bytes)
            );
            self.sink.on_progress(ProgressEvent::Finished {
                stage: Stage::Archive,
                bytes: result.size_bytes,
                elapsed: result.elapsed,
            });

            Ok(result)
        }
        .instrument(span)
        .await
    }
}
