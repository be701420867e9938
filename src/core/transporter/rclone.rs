use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{Instrument, debug, info, info_span};

use super::Transporter;
use crate::core::models::{Destination, TransferResult};
use crate::core::process::spawn_line_reader;
use crate::core::progress::{ProgressEvent, ProgressSink, Stage};
use crate::error::{ExitDescription, TransferError};
use crate::logging::LogThrottle;

/// Uploads with `rclone copy`, reading its JSON log for transfer stats.
pub struct RcloneTransporter {
    program: String,
    stats_interval: Duration,
    extra_args: Vec<String>,
    sink: Arc<dyn ProgressSink>,
}

#[derive(Debug, Deserialize)]
struct LogRecord {
    #[serde(default)]
    level: String,
    #[serde(default)]
    msg: String,
    stats: Option<StatsRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsRecord {
    #[serde(default)]
    bytes: u64,
    #[serde(default)]
    total_bytes: u64,
    #[serde(default)]
    speed: f64,
    eta: Option<f64>,
}

/// One line of rclone's stderr.
#[derive(Debug, Clone, PartialEq)]
pub enum RcloneLine {
    Stats {
        bytes: u64,
        total_bytes: Option<u64>,
        bytes_per_sec: f64,
        eta_seconds: Option<u64>,
    },
    Message {
        level: String,
        message: String,
    },
    Plain(String),
}

pub fn parse_log_line(line: &str) -> RcloneLine {
    let Ok(record) = serde_json::from_str::<LogRecord>(line) else {
        return RcloneLine::Plain(line.to_string());
    };

    match record.stats {
        Some(stats) => RcloneLine::Stats {
            bytes: stats.bytes,
            total_bytes: (stats.total_bytes > 0).then_some(stats.total_bytes),
            bytes_per_sec: stats.speed.max(0.0),
            eta_seconds: stats.eta.filter(|e| *e >= 0.0).map(|e| e.round() as u64),
        },
        None => RcloneLine::Message {
            level: record.level,
            message: record.msg.trim_end().to_string(),
        },
    }
}

impl RcloneTransporter {
    pub fn new(
        program: impl Into<String>,
        stats_interval: Duration,
        extra_args: Vec<String>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            program: program.into(),
            stats_interval,
            extra_args,
            sink,
        }
    }

    pub fn args(&self, archive: &Path, destination: &Destination) -> Vec<String> {
        let mut args = vec![
            "copy".to_string(),
            archive.to_string_lossy().into_owned(),
            destination.to_string(),
            "--use-json-log".to_string(),
            "--stats".to_string(),
            format!("{}ms", self.stats_interval.as_millis().max(1)),
            "--stats-log-level".to_string(),
            "NOTICE".to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }

    async fn upload(
        &self,
        archive: &Path,
        destination: &Destination,
    ) -> Result<TransferResult, TransferError> {
        let started = Instant::now();

        let archive_size = tokio::fs::metadata(archive)
            .await
            .map_err(|_| TransferError::MissingArchive(archive.to_path_buf()))?
            .len();

        let mut child = Command::new(&self.program)
            .args(self.args(archive, destination))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TransferError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let transferred = Arc::new(AtomicU64::new(0));
        let reader = child.stderr.take().map(|stderr| {
            let sink = self.sink.clone();
            let transferred = transferred.clone();
            let throttle = LogThrottle::new(self.stats_interval);
            spawn_line_reader(stderr, move |line| match parse_log_line(&line) {
                RcloneLine::Stats {
                    bytes,
                    total_bytes,
                    bytes_per_sec,
                    eta_seconds,
                } => {
                    let previous = transferred.fetch_max(bytes, Ordering::Relaxed);
                    if throttle.should_log() {
                        sink.on_progress(ProgressEvent::Uploading {
                            bytes: bytes.max(previous),
                            total_bytes,
                            bytes_per_sec,
                            eta_seconds,
                        });
                    }
                }
                RcloneLine::Message { level, message } => match level.as_str() {
                    "error" | "critical" | "alert" | "emergency" => {
                        sink.on_progress(ProgressEvent::ToolMessage {
                            stage: Stage::Upload,
                            message,
                        });
                    }
                    _ => debug!(level = %level, "{}", message),
                },
                RcloneLine::Plain(text) => debug!("{}", text),
            })
        });

        let status = child.wait().await.map_err(|e| TransferError::Io {
            context: format!("failed to wait for `{}`", self.program),
            source: e,
        })?;

        if let Some(reader) = reader {
            let _ = reader.await;
        }

        if !status.success() {
            return Err(TransferError::Failed {
                program: self.program.clone(),
                status: ExitDescription::from(status),
            });
        }

        let reported = transferred.load(Ordering::Relaxed);
        let bytes_transferred = if reported == 0 {
            archive_size
        } else {
            reported
        };

        Ok(TransferResult {
            bytes_transferred,
            elapsed: started.elapsed(),
        })
    }
}

#[async_trait]
impl Transporter for RcloneTransporter {
    fn required_programs(&self) -> Vec<String> {
        vec![self.program.clone()]
    }

    async fn run(
        &self,
        archive: &Path,
        destination: &Destination,
    ) -> Result<TransferResult, TransferError> {
        let span = info_span!("upload", destination = %destination);

        async {
            self.sink.on_progress(ProgressEvent::Started {
                stage: Stage::Upload,
                description: format!("Uploading backup to {destination}..."),
            });

            let result = self.upload(archive, destination).await?;

            info!("Upload completed successfully!");
            self.sink.on_progress(ProgressEvent::Finished {
                stage: Stage::Upload,
                bytes: result.bytes_transferred,
                elapsed: result.elapsed,
            });

            Ok(result)
        }
        .instrument(span)
        .await
    }
}
