use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::core::{
    Archiver, Orchestrator, ProgressSink, RcloneTransporter, Transporter, create_archiver,
};

/// Everything one run needs, resolved once at startup.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub run_id: Uuid,
    pub sink: Arc<dyn ProgressSink>,
}

impl AppContext {
    pub fn new(config: AppConfig, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            config: Arc::new(config),
            run_id: Uuid::now_v7(),
            sink,
        }
    }

    pub fn archiver(&self) -> Result<Arc<dyn Archiver>> {
        let kind = self.config.archiver_kind();
        let settings = self.config.archiver_settings(kind, self.run_id)?;
        Ok(Arc::from(create_archiver(kind, &settings, self.sink.clone())))
    }

    pub fn transporter(&self) -> Arc<dyn Transporter> {
        Arc::new(RcloneTransporter::new(
            self.config.tools.rclone.clone(),
            self.config.poll_interval(),
            self.config.rclone_args.clone(),
            self.sink.clone(),
        ))
    }

    pub fn orchestrator(&self) -> Result<Orchestrator> {
        Ok(Orchestrator::new(
            self.run_id,
            self.archiver()?,
            self.transporter(),
        ))
    }
}
