use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Broad classification of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    DependencyMissing,
    Archive,
    Transfer,
    Timeout,
    /// Recovered by the archiver's retry loop; only seen if a caller bypasses it.
    TransientInterrupt,
}

/// How a child process ended, for error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitDescription {
    pub code: Option<i32>,
}

impl From<ExitStatus> for ExitDescription {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for ExitDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "termination by signal"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("destination `{0}` must include a backend name (e.g. 'drive:')")]
    MissingBackend(String),

    #[error("destination `{0}` has an empty backend name")]
    EmptyBackend(String),

    #[error("source directory `{0}` does not exist")]
    SourceMissing(PathBuf),

    #[error("`{0}` is not a directory")]
    SourceNotDirectory(PathBuf),
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("failed to spawn {stage} stage `{program}`: {source}")]
    Spawn {
        stage: &'static str,
        program: String,
        source: std::io::Error,
    },

    #[error("compression failed: `{program}` exited with {status}")]
    CompressionFailed {
        program: String,
        status: ExitDescription,
    },

    #[error("archiving failed: `{program}` exited with {status}")]
    PackingFailed {
        program: String,
        status: ExitDescription,
    },

    #[error("archiving tool `{program}` failed with {status}")]
    ToolFailed {
        program: String,
        status: ExitDescription,
    },

    #[error("archiving timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("archiving was interrupted {attempts} time(s), giving up")]
    RetriesExhausted { attempts: u32 },

    #[error("interrupted while waiting for archiving stages: {0}")]
    Interrupted(std::io::Error),

    #[error("archive `{0}` was not created")]
    MissingOutput(PathBuf),

    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl ArchiveError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("upload with `{program}` failed with {status}")]
    Failed {
        program: String,
        status: ExitDescription,
    },

    #[error("archive `{0}` does not exist")]
    MissingArchive(PathBuf),

    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum BackupError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("`{program}` is not found in PATH, please install it first")]
    DependencyMissing { program: String },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl BackupError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) => FailureKind::Validation,
            Self::DependencyMissing { .. } => FailureKind::DependencyMissing,
            Self::Archive(ArchiveError::TimedOut(_) | ArchiveError::RetriesExhausted { .. }) => {
                FailureKind::Timeout
            }
            Self::Archive(ArchiveError::Interrupted(_)) => FailureKind::TransientInterrupt,
            Self::Archive(_) => FailureKind::Archive,
            Self::Transfer(_) => FailureKind::Transfer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_description_formats_code_and_signal() {
        assert_eq!(ExitDescription { code: Some(3) }.to_string(), "exit code 3");
        assert_eq!(
            ExitDescription { code: None }.to_string(),
            "termination by signal"
        );
    }

    #[test]
    fn timeouts_and_exhausted_retries_share_a_kind() {
        let timed_out = BackupError::from(ArchiveError::TimedOut(Duration::from_secs(5)));
        let exhausted = BackupError::from(ArchiveError::RetriesExhausted { attempts: 2 });
        let failed = BackupError::from(ArchiveError::PackingFailed {
            program: "tar".into(),
            status: ExitDescription { code: Some(2) },
        });

        assert_eq!(timed_out.kind(), FailureKind::Timeout);
        assert_eq!(exhausted.kind(), FailureKind::Timeout);
        assert_eq!(failed.kind(), FailureKind::Archive);
    }
}
