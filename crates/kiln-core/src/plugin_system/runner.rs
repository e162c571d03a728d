//! Build/test sequencing for a single plugin.
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::error::Result;
use crate::plugin_system::record::PluginRecord;
use crate::plugin_system::toolchain::{TestOutcome, Toolchain};
use crate::utils::path_exists;

/// Snapshot of a record for building or testing, detached from the registry
/// lock so it can move into a worker task.
#[derive(Debug, Clone)]
pub struct BuildJob {
    pub alias: String,
    /// `None` for prebuilt artifacts.
    pub source_dir: Option<PathBuf>,
    pub artifact: PathBuf,
    pub update: bool,
}

impl BuildJob {
    pub fn for_record(record: &PluginRecord) -> Self {
        Self {
            alias: record.alias().to_string(),
            source_dir: record.source_dir().map(PathBuf::from),
            artifact: record.artifact().to_path_buf(),
            update: record.update(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    Skipped,
}

#[derive(Clone)]
pub struct Runner {
    toolchain: Arc<dyn Toolchain>,
}

impl Runner {
    pub fn new(toolchain: Arc<dyn Toolchain>) -> Self {
        Self { toolchain }
    }

    /// Build the plugin into its artifact path.
    pub async fn build(&self, job: &BuildJob) -> Result<StepOutcome> {
        let Some(source_dir) = &job.source_dir else {
            debug!("[{}] Prebuilt artifact, nothing to build", job.alias);
            return Ok(StepOutcome::Skipped);
        };

        info!("[{}] Building...", job.alias);
        if let Err(e) = self.toolchain.build(source_dir, &job.artifact).await {
            error!("[{}] Build failed", job.alias);
            return Err(e);
        }
        info!("[{}] Build complete!", job.alias);
        Ok(StepOutcome::Done)
    }

    /// Run the plugin's tests. Skipped when the artifact already exists and
    /// the plugin is not flagged for update.
    pub async fn test(&self, job: &BuildJob) -> Result<StepOutcome> {
        let Some(source_dir) = &job.source_dir else {
            debug!("[{}] Prebuilt artifact, nothing to test", job.alias);
            return Ok(StepOutcome::Skipped);
        };
        if !job.update && path_exists(&job.artifact).await {
            debug!("[{}] Artifact exists and no update requested, skipping tests", job.alias);
            return Ok(StepOutcome::Skipped);
        }

        info!("[{}] Testing...", job.alias);
        match self.toolchain.run_tests(source_dir).await {
            Ok(TestOutcome::Passed) => info!("[{}] Test passed!", job.alias),
            Ok(TestOutcome::NoTests) => warn!("[{}] No tests found", job.alias),
            Err(e) => {
                error!("[{}] Test failed", job.alias);
                return Err(e);
            }
        }
        Ok(StepOutcome::Done)
    }
}
