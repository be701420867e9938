use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ValidationError;

/// Everything the archiver needs to know about one run.
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub source_directory: PathBuf,
    pub exclude_patterns: Vec<String>,
    pub verbose: bool,
}

impl BackupRequest {
    /// Build a request, checking that the source is an existing directory.
    pub fn new(
        source_directory: impl Into<PathBuf>,
        exclude_patterns: Vec<String>,
        verbose: bool,
    ) -> Result<Self, ValidationError> {
        let source_directory = source_directory.into();

        if !source_directory.exists() {
            return Err(ValidationError::SourceMissing(source_directory));
        }
        if !source_directory.is_dir() {
            return Err(ValidationError::SourceNotDirectory(source_directory));
        }

        Ok(Self {
            source_directory,
            exclude_patterns,
            verbose,
        })
    }
}

/// A remote location in rclone's `backend:path` notation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub backend: String,
    pub path: String,
}

impl FromStr for Destination {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (backend, path) = s
            .split_once(':')
            .ok_or_else(|| ValidationError::MissingBackend(s.to_string()))?;

        if backend.trim().is_empty() {
            return Err(ValidationError::EmptyBackend(s.to_string()));
        }

        Ok(Self {
            backend: backend.to_string(),
            path: path.to_string(),
        })
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.backend, self.path)
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveResult {
    pub archive_path: PathBuf,
    pub size_bytes: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct TransferResult {
    pub bytes_transferred: u64,
    pub elapsed: Duration,
}

/// Format a byte count the way progress lines show it.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}
