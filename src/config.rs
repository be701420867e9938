use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{ArchiverKind, ArchiverSettings, ToolPaths};
use crate::platform::{self, Platform};

pub const ENV_PREFIX: &str = "BACKUP_HOME_";
const DEFAULT_CONFIG_FILE: &str = ".config/backup-home.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory to back up; the user's home directory when unset.
    pub source: Option<PathBuf>,
    pub verbose: bool,
    pub json_logs: bool,
    /// Archiver variant; detected from the platform when unset.
    pub archiver: Option<ArchiverKind>,
    pub archive_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub max_interrupt_retries: u32,
    /// Worker count passed to the compressor.
    pub compressor_threads: Option<usize>,
    /// Where the archive is written; the system temp directory when unset.
    pub temp_dir: Option<PathBuf>,
    /// Append a per-run token to the archive name so concurrent runs by the
    /// same user do not share a file.
    pub unique_archive_names: bool,
    pub use_default_excludes: bool,
    /// Patterns excluded in addition to the platform defaults.
    pub excludes: Vec<String>,
    /// Extra flags passed to `rclone copy`.
    pub rclone_args: Vec<String>,
    pub tools: ToolPaths,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: None,
            verbose: false,
            json_logs: false,
            archiver: None,
            archive_timeout_secs: 3600,
            poll_interval_ms: 1000,
            max_interrupt_retries: 1,
            compressor_threads: None,
            temp_dir: None,
            unique_archive_names: false,
            use_default_excludes: true,
            excludes: Vec::new(),
            rclone_args: Vec::new(),
            tools: ToolPaths::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the config file, the environment and
    /// finally the command line, later sources winning.
    pub fn new<T: Serialize>(config_file: Option<&Path>, cli_args: Option<&T>) -> Result<Self> {
        if let Some(path) = config_file {
            if !path.exists() {
                bail!("config file `{}` does not exist", path.display());
            }
        }

        let file = match config_file {
            Some(path) => Some(path.to_path_buf()),
            None => platform::home_dir().map(|home| home.join(DEFAULT_CONFIG_FILE)),
        };

        Self::figment(file.as_deref(), cli_args)
            .extract()
            .context("Failed to load configuration")
    }

    pub fn figment<T: Serialize>(config_file: Option<&Path>, cli_args: Option<&T>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        // Arrays from the command line extend the configured ones.
        if let Some(args) = cli_args {
            figment = figment.admerge(Serialized::defaults(args));
        }

        figment
    }

    pub fn archiver_kind(&self) -> ArchiverKind {
        self.archiver.unwrap_or_else(ArchiverKind::detect)
    }

    pub fn source_directory(&self) -> Result<PathBuf> {
        match &self.source {
            Some(source) => Ok(source.clone()),
            None => platform::home_dir().context("Could not determine the home directory"),
        }
    }

    pub fn exclude_patterns(&self, platform: Platform) -> Vec<String> {
        let mut patterns = if self.use_default_excludes {
            platform.default_excludes()
        } else {
            Vec::new()
        };
        patterns.extend(self.excludes.iter().cloned());
        patterns
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// `<temp>/<username>.<ext>`, or `<temp>/<username>-<run id>.<ext>` with
    /// unique names enabled.
    pub fn archive_path(&self, kind: ArchiverKind, run_id: Uuid) -> Result<PathBuf> {
        let username = platform::username().context("Could not determine the current user")?;
        let stem = if self.unique_archive_names {
            format!("{username}-{run_id}")
        } else {
            username
        };

        let dir = self.temp_dir.clone().unwrap_or_else(std::env::temp_dir);
        Ok(dir.join(format!("{stem}.{}", kind.extension())))
    }

    pub fn archiver_settings(&self, kind: ArchiverKind, run_id: Uuid) -> Result<ArchiverSettings> {
        Ok(ArchiverSettings {
            archive_path: self.archive_path(kind, run_id)?,
            tools: self.tools.clone(),
            compressor_threads: self.compressor_threads,
            timeout: Duration::from_secs(self.archive_timeout_secs),
            poll_interval: self.poll_interval(),
            max_interrupt_retries: self.max_interrupt_retries,
        })
    }
}
