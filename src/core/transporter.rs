mod rclone;

use std::path::Path;

use async_trait::async_trait;

pub use rclone::{RcloneLine, RcloneTransporter, parse_log_line};

use crate::core::models::{Destination, TransferResult};
use crate::error::TransferError;

/// Copies a finished archive to remote storage.
#[async_trait]
pub trait Transporter: Send + Sync {
    /// Executables that must be on the search path before `run` is called.
    fn required_programs(&self) -> Vec<String>;

    async fn run(
        &self,
        archive: &Path,
        destination: &Destination,
    ) -> Result<TransferResult, TransferError>;
}
