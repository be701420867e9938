use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span};

use super::{Archiver, ArchiverSettings, remove_partial, retry_interrupted};
use crate::core::models::{ArchiveResult, BackupRequest, format_bytes};
use crate::core::process::{spawn_line_reader, terminate};
use crate::core::progress::{ProgressEvent, ProgressSink, Stage, monitor_file_growth};
use crate::error::ArchiveError;

/// The packer command line and the directory it runs from.
#[derive(Debug, Clone)]
pub struct PackerInvocation {
    pub working_dir: PathBuf,
    pub args: Vec<OsString>,
}

/// Two-stage archiver: `tar` streams into a compressor that writes the archive.
pub struct PipedArchiver {
    packer: String,
    compressor: String,
    compressor_threads: Option<usize>,
    archive_path: PathBuf,
    timeout: Duration,
    poll_interval: Duration,
    max_interrupt_retries: u32,
    sink: Arc<dyn ProgressSink>,
}

impl PipedArchiver {
    pub fn new(settings: &ArchiverSettings, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            packer: settings.tools.tar.clone(),
            compressor: settings.tools.compressor.clone(),
            compressor_threads: settings.compressor_threads,
            archive_path: settings.archive_path.clone(),
            timeout: settings.timeout,
            poll_interval: settings.poll_interval,
            max_interrupt_retries: settings.max_interrupt_retries,
            sink,
        }
    }

    /// The packer runs from the source's parent so archive members are
    /// prefixed with the source directory's own name.
    pub fn packer_invocation(&self, request: &BackupRequest) -> PackerInvocation {
        let source = &request.source_directory;
        let (working_dir, member) = match (source.parent(), source.file_name()) {
            (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
                (parent.to_path_buf(), name.to_os_string())
            }
            _ => (source.clone(), OsString::from(".")),
        };

        let mut args: Vec<OsString> = vec!["-c".into(), "-f".into(), "-".into()];
        if request.verbose {
            args.push("-v".into());
        }
        for pattern in &request.exclude_patterns {
            args.push("--exclude".into());
            args.push(pattern.into());
        }
        args.push(member);

        PackerInvocation { working_dir, args }
    }

    pub fn compressor_args(&self) -> Vec<String> {
        match self.compressor_threads {
            Some(threads) => vec!["-p".to_string(), threads.to_string()],
            None => Vec::new(),
        }
    }

    async fn run_once(&self, request: &BackupRequest) -> Result<ArchiveResult, ArchiveError> {
        let started = Instant::now();
        let invocation = self.packer_invocation(request);

        info!(
            "Running command from {}: {} {} | {} > {}",
            invocation.working_dir.display(),
            self.packer,
            invocation
                .args
                .iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" "),
            self.compressor,
            self.archive_path.display()
        );

        let mut packer = Command::new(&self.packer)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ArchiveError::Spawn {
                stage: "packing",
                program: self.packer.clone(),
                source,
            })?;

        let handoff = packer
            .stdout
            .take()
            .map(|stdout| -> io::Result<Stdio> { stdout.try_into() });
        let pipe = match handoff {
            Some(Ok(pipe)) => pipe,
            Some(Err(e)) => {
                terminate(&mut packer, &self.packer).await;
                return Err(ArchiveError::io(
                    "failed to hand packer output to the compressor",
                    e,
                ));
            }
            None => {
                terminate(&mut packer, &self.packer).await;
                return Err(ArchiveError::io(
                    "packer output was not captured",
                    io::Error::other("missing stdout"),
                ));
            }
        };

        // Created only once the packer is running, so a stage that never
        // starts leaves nothing behind.
        let output = match std::fs::File::create(&self.archive_path) {
            Ok(file) => file,
            Err(e) => {
                terminate(&mut packer, &self.packer).await;
                return Err(ArchiveError::io(
                    format!("failed to create `{}`", self.archive_path.display()),
                    e,
                ));
            }
        };

        // The command owns our only copy of the pipe. Dropping it right after
        // spawn leaves the compressor as the sole reader, so the packer gets
        // EPIPE instead of blocking if the compressor dies early.
        let spawned = {
            let mut command = Command::new(&self.compressor);
            command
                .args(self.compressor_args())
                .stdin(pipe)
                .stdout(Stdio::from(output))
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            command.spawn()
        };

        let mut compressor = match spawned {
            Ok(child) => child,
            Err(source) => {
                terminate(&mut packer, &self.packer).await;
                remove_partial(&self.archive_path).await;
                return Err(ArchiveError::Spawn {
                    stage: "compression",
                    program: self.compressor.clone(),
                    source,
                });
            }
        };

        let packer_log = packer.stderr.take().map(|stderr| {
            let sink = self.sink.clone();
            let verbose = request.verbose;
            let prefix = format!("{}: ", program_name(&self.packer));
            spawn_line_reader(stderr, move |line| {
                if verbose && !line.starts_with(&prefix) {
                    sink.on_progress(ProgressEvent::FileArchived(line));
                } else {
                    sink.on_progress(ProgressEvent::ToolMessage {
                        stage: Stage::Archive,
                        message: line,
                    });
                }
            })
        });
        let compressor_log = compressor.stderr.take().map(|stderr| {
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

        // The compressor is the terminal stage, so it is awaited first.
        let waited = tokio::time::timeout(self.timeout, async {
            let compressor_status = compressor.wait().await?;
            let packer_status = packer.wait().await?;
            Ok::<_, io::Error>((compressor_status, packer_status))
        })
        .await;

        cancel.cancel();
        let _ = monitor.await;

        let (compressor_status, packer_status) = match waited {
            Ok(Ok(statuses)) => statuses,
            Ok(Err(e)) => {
                terminate(&mut compressor, &self.compressor).await;
                terminate(&mut packer, &self.packer).await;
                remove_partial(&self.archive_path).await;
                return Err(if e.kind() == io::ErrorKind::Interrupted {
                    ArchiveError::Interrupted(e)
                } else {
                    ArchiveError::io("failed to wait for archiving stages", e)
                });
            }
            Err(_) => {
                tracing::error!(
                    timeout_secs = self.timeout.as_secs(),
                    "Backup process timed out, stopping archiving stages"
                );
                terminate(&mut compressor, &self.compressor).await;
                terminate(&mut packer, &self.packer).await;
                remove_partial(&self.archive_path).await;
                return Err(ArchiveError::TimedOut(self.timeout));
            }
        };

        for reader in [packer_log, compressor_log].into_iter().flatten() {
            let _ = reader.await;
        }

        if !compressor_status.success() {
            remove_partial(&self.archive_path).await;
            return Err(ArchiveError::CompressionFailed {
                program: self.compressor.clone(),
                status: compressor_status.into(),
            });
        }
        if !packer_status.success() {
            remove_partial(&self.archive_path).await;
            return Err(ArchiveError::PackingFailed {
                program: self.packer.clone(),
                status: packer_status.into(),
            });
        }

        let size_bytes = tokio::fs::metadata(&self.archive_path)
            .await
            .map_err(|_| ArchiveError::MissingOutput(self.archive_path.clone()))?
            .len();

        debug!(size_bytes, "Both archiving stages exited cleanly");

        Ok(ArchiveResult {
            archive_path: self.archive_path.clone(),
            size_bytes,
            elapsed: started.elapsed(),
        })
    }
}

#[async_trait]
impl Archiver for PipedArchiver {
    fn required_programs(&self) -> Vec<String> {
        vec![self.packer.clone(), self.compressor.clone()]
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

            let result =
                retry_interrupted(self.max_interrupt_retries, || self.run_once(request)).await?;

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

fn program_name(program: &str) -> String {
    Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::archiver::ToolPaths;
    use crate::core::progress::ChannelSink;

    fn archiver(threads: Option<usize>) -> PipedArchiver {
        let settings = ArchiverSettings {
            archive_path: PathBuf::from("/tmp/someone.tar.gz"),
            tools: ToolPaths::default(),
            compressor_threads: threads,
            timeout: Duration::from_secs(3600),
            poll_interval: Duration::from_secs(1),
            max_interrupt_retries: 1,
        };
        let (sink, _rx) = ChannelSink::channel();
        PipedArchiver::new(&settings, Arc::new(sink))
    }

    fn request(source: &str, excludes: &[&str], verbose: bool) -> BackupRequest {
        BackupRequest {
            source_directory: PathBuf::from(source),
            exclude_patterns: excludes.iter().map(|s| s.to_string()).collect(),
            verbose,
        }
    }

    fn args(invocation: &PackerInvocation) -> Vec<String> {
        invocation
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn excludes_become_separate_ordered_arguments() {
        let invocation = archiver(None)
            .packer_invocation(&request("/home/alice", &["*.log", "node_modules"], false));

        assert_eq!(
            args(&invocation),
            vec![
                "-c",
                "-f",
                "-",
                "--exclude",
                "*.log",
                "--exclude",
                "node_modules",
                "alice"
            ]
        );
        assert_eq!(invocation.working_dir, PathBuf::from("/home"));
    }

    #[test]
    fn verbose_adds_listing_flag() {
        let invocation = archiver(None).packer_invocation(&request("/home/alice", &[], true));
        assert_eq!(args(&invocation), vec!["-c", "-f", "-", "-v", "alice"]);
    }

    #[test]
    fn pattern_with_spaces_stays_one_argument() {
        let invocation = archiver(None).packer_invocation(&request(
            "/Users/bob",
            &["./Library/Application Support/Slack"],
            false,
        ));
        assert!(
            args(&invocation)
                .windows(2)
                .any(|w| w == ["--exclude", "./Library/Application Support/Slack"])
        );
    }

    #[test]
    fn root_source_archives_from_itself() {
        let invocation = archiver(None).packer_invocation(&request("/", &[], false));
        assert_eq!(invocation.working_dir, PathBuf::from("/"));
        assert_eq!(args(&invocation).last().map(String::as_str), Some("."));
    }

    #[test]
    fn compressor_threads_hint() {
        assert!(archiver(None).compressor_args().is_empty());
        assert_eq!(archiver(Some(4)).compressor_args(), vec!["-p", "4"]);
    }

    #[test]
    fn program_name_strips_directories() {
        assert_eq!(program_name("/usr/bin/tar"), "tar");
        assert_eq!(program_name("tar"), "tar");
    }
}
