pub mod archiver;
pub mod dependencies;
pub mod models;
pub mod orchestrator;
pub mod process;
pub mod progress;
pub mod transporter;

pub use archiver::{Archiver, ArchiverKind, ArchiverSettings, ToolPaths, create_archiver};
pub use models::{ArchiveResult, BackupRequest, Destination, TransferResult};
pub use orchestrator::{ArchiveGuard, Orchestrator, PreviewSummary, RunOptions, RunSummary};
pub use progress::{ChannelSink, ProgressEvent, ProgressSample, ProgressSink, TracingSink};
pub use transporter::{RcloneTransporter, Transporter};
