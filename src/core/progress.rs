//! Live progress reporting for the archive and upload stages.
//!
//! Components never log progress directly. They are handed a [`ProgressSink`]
//! at construction and push [`ProgressEvent`]s into it; the binary wires in a
//! [`TracingSink`] while tests capture events through a [`ChannelSink`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::models::format_bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Archive,
    Upload,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Archive => "archive",
            Self::Upload => "upload",
        }
    }
}

/// One reading of a growing byte count.
#[derive(Debug, Clone, Copy)]
pub struct ProgressSample {
    pub timestamp: Instant,
    pub cumulative_bytes: u64,
    pub bytes_per_sec: f64,
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Started {
        stage: Stage,
        description: String,
    },
    /// Periodic size reading of the archive being written.
    Archiving(ProgressSample),
    /// A path reported by the packer in verbose mode.
    FileArchived(String),
    Uploading {
        bytes: u64,
        total_bytes: Option<u64>,
        bytes_per_sec: f64,
        eta_seconds: Option<u64>,
    },
    /// A diagnostic line from an external tool.
    ToolMessage {
        stage: Stage,
        message: String,
    },
    Finished {
        stage: Stage,
        bytes: u64,
        elapsed: Duration,
    },
}

pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

/// Turns successive byte counts into throughput samples.
///
/// The cumulative count never goes backwards: a smaller reading (the file was
/// truncated or briefly unreadable) repeats the previous total with zero
/// throughput.
#[derive(Debug, Default)]
pub struct ProgressSampler {
    last: Option<(Instant, u64)>,
}

impl ProgressSampler {
    pub fn new() -> Self {
        Self { last: None }
    }

    pub fn record(&mut self, at: Instant, bytes: u64) -> ProgressSample {
        let sample = match self.last {
            None => ProgressSample {
                timestamp: at,
                cumulative_bytes: bytes,
                bytes_per_sec: 0.0,
            },
            Some((prev_at, prev_bytes)) => {
                let cumulative_bytes = bytes.max(prev_bytes);
                let elapsed = at.saturating_duration_since(prev_at).as_secs_f64();
                let bytes_per_sec = if elapsed > 0.0 {
                    (cumulative_bytes - prev_bytes) as f64 / elapsed
                } else {
                    0.0
                };
                ProgressSample {
                    timestamp: at,
                    cumulative_bytes,
                    bytes_per_sec,
                }
            }
        };

        self.last = Some((sample.timestamp, sample.cumulative_bytes));
        sample
    }
}

/// Poll the size of `path` every `interval` until `cancel` fires.
///
/// Returns the last sample taken. A missing file reads as zero bytes.
pub async fn monitor_file_growth(
    path: PathBuf,
    interval: Duration,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
) -> ProgressSample {
    let mut sampler = ProgressSampler::new();
    let mut last = sampler.record(Instant::now(), current_size(&path).await);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        last = sampler.record(Instant::now(), current_size(&path).await);
        sink.on_progress(ProgressEvent::Archiving(last));
    }

    last
}

async fn current_size(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

/// Writes progress to the tracing subscriber.
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn on_progress(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { stage, description } => {
                info!(stage = stage.as_str(), "{}", description);
            }
            ProgressEvent::Archiving(sample) => {
                info!(
                    size_bytes = sample.cumulative_bytes,
                    bytes_per_sec = sample.bytes_per_sec as u64,
                    "Archive size: {} ({}/s)",
                    format_bytes(sample.cumulative_bytes),
                    format_bytes(sample.bytes_per_sec as u64)
                );
            }
            ProgressEvent::FileArchived(path) => {
                debug!("{}", path);
            }
            ProgressEvent::Uploading {
                bytes,
                total_bytes,
                bytes_per_sec,
                eta_seconds,
            } => {
                let total = total_bytes
                    .map(format_bytes)
                    .unwrap_or_else(|| "?".to_string());
                let eta = eta_seconds
                    .map(|s| format!(", ETA {s}s"))
                    .unwrap_or_default();
                info!(
                    bytes,
                    bytes_per_sec = bytes_per_sec as u64,
                    "Uploaded {} / {} ({}/s{})",
                    format_bytes(bytes),
                    total,
                    format_bytes(bytes_per_sec as u64),
                    eta
                );
            }
            ProgressEvent::ToolMessage { stage, message } => {
                warn!(stage = stage.as_str(), "{}", message);
            }
            ProgressEvent::Finished {
                stage,
                bytes,
                elapsed,
            } => {
                info!(
                    stage = stage.as_str(),
                    bytes,
                    elapsed_secs = elapsed.as_secs_f64(),
                    "Finished {} stage: {} in {:.1}s",
                    stage.as_str(),
                    format_bytes(bytes),
                    elapsed.as_secs_f64()
                );
            }
        }
    }
}

/// Forwards events into a channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}
