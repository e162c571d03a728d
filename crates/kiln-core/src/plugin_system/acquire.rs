//! # Acquisition Engine
//!
//! Brings the clone of a repository plugin to the requested branch or
//! version. The sequence per repository is:
//!
//! 1. clone when no checkout directory exists (a missing remote is a warning);
//! 2. with a target, check it out, fetching tags and retrying once when the
//!    target is unknown. A detached checkout is pinned and never pulled;
//! 3. otherwise pull, refreshing dependencies unless already up to date.
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info, warn};

use crate::error::Result;
use crate::plugin_system::git::{CheckoutOutcome, CloneOutcome, PullOutcome, SourceControl};
use crate::plugin_system::record::PluginRecord;
use crate::plugin_system::source::{DedupeStrategy, Layout, RepoRef};
use crate::plugin_system::toolchain::Toolchain;
use crate::utils::path_exists;

/// Everything needed to acquire one repository.
#[derive(Debug, Clone)]
pub struct AcquireJob {
    /// Alias of the record that triggered the acquisition, for logging.
    pub alias: String,
    pub repo: RepoRef,
    pub checkout_dir: PathBuf,
    pub source_dir: PathBuf,
    pub target: Option<String>,
}

impl AcquireJob {
    pub fn for_record(record: &PluginRecord, layout: &Layout, branch_override: Option<&str>) -> Option<Self> {
        let repo = record.repository()?;
        Some(Self {
            alias: record.alias().to_string(),
            repo: repo.clone(),
            checkout_dir: repo.checkout_dir(layout.source_root()),
            source_dir: repo.source_dir(layout.source_root()),
            target: record.target(branch_override).map(str::to_string),
        })
    }
}

/// Select the records to acquire: repository records only, one per
/// repository identity, in registration order. Returns record indices.
pub fn dedupe<'a, I>(records: I, strategy: DedupeStrategy) -> Vec<usize>
where
    I: IntoIterator<Item = &'a PluginRecord>,
{
    let mut seen = HashSet::new();
    records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| {
            let repo = record.repository()?;
            seen.insert(repo.dedupe_key(strategy)).then_some(index)
        })
        .collect()
}

/// What happened to a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The remote does not exist; nothing was done.
    Missing,
    /// Checked out a detached version.
    Pinned,
    /// Tracking a branch that was already current.
    UpToDate,
    /// Tracking a branch that received new commits.
    Updated,
}

/// Whether a checked out target still needs a pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Pinned,
    Tracking,
}

#[derive(Clone)]
pub struct AcquisitionEngine {
    git: Arc<dyn SourceControl>,
    toolchain: Arc<dyn Toolchain>,
    scheme: String,
}

impl AcquisitionEngine {
    pub fn new(git: Arc<dyn SourceControl>, toolchain: Arc<dyn Toolchain>, scheme: impl Into<String>) -> Self {
        Self {
            git,
            toolchain,
            scheme: scheme.into(),
        }
    }

    /// Run the full acquisition sequence for one repository.
    pub async fn acquire(&self, job: &AcquireJob) -> Result<AcquireOutcome> {
        info!("[{}] Updating plugin source: {}", job.alias, job.repo.repository());
        if !self.ensure_fetched(job).await? {
            return Ok(AcquireOutcome::Missing);
        }

        match &job.target {
            Some(target) => {
                info!("[{}] Updating \"{}\" branch...", job.alias, target);
                if self.resolve_target(job, target).await? == TargetState::Pinned {
                    return Ok(AcquireOutcome::Pinned);
                }
            }
            None => info!("[{}] Updating current branch...", job.alias),
        }

        match self.sync(job).await? {
            PullOutcome::UpToDate => Ok(AcquireOutcome::UpToDate),
            PullOutcome::Changed => Ok(AcquireOutcome::Updated),
        }
    }

    /// Clone the repository unless its checkout directory exists.
    ///
    /// Returns `false` when the remote does not exist.
    pub async fn ensure_fetched(&self, job: &AcquireJob) -> Result<bool> {
        if path_exists(&job.checkout_dir).await {
            return Ok(true);
        }

        info!("[{}] Source does not exist, fetching...", job.alias);
        let url = job.repo.clone_url(&self.scheme);
        match self.git.clone_repository(&url, &job.checkout_dir).await? {
            CloneOutcome::Cloned => Ok(true),
            CloneOutcome::Missing(diagnostics) => {
                warn!("[{}] unable to fetch source {}: {}", job.alias, url, diagnostics);
                Ok(false)
            }
        }
    }

    /// Check out `target`, fetching tags and retrying once when git does not
    /// know it.
    pub async fn resolve_target(&self, job: &AcquireJob, target: &str) -> Result<TargetState> {
        let outcome = match self.git.checkout(&job.checkout_dir, target).await {
            Ok(outcome) => outcome,
            Err(e) => {
                info!("[{}] Target branch not found ({}), fetching version tags...", job.alias, e);
                if let Err(e) = self.git.fetch_tags(&job.checkout_dir).await {
                    error!("[{}] Unable to fetch tags.", job.alias);
                    return Err(e);
                }
                self.git.checkout(&job.checkout_dir, target).await?
            }
        };

        match outcome {
            CheckoutOutcome::Detached => {
                info!("[{}] Set version: {}", job.alias, target);
                self.refresh_dependencies(job).await?;
                Ok(TargetState::Pinned)
            }
            CheckoutOutcome::Switched => {
                info!("[{}] Switched to \"{}\" branch.", job.alias, target);
                Ok(TargetState::Tracking)
            }
            CheckoutOutcome::AlreadyOn => Ok(TargetState::Tracking),
        }
    }

    /// Pull the tracked branch and refresh dependencies if anything changed.
    pub async fn sync(&self, job: &AcquireJob) -> Result<PullOutcome> {
        let outcome = self.git.pull(&job.checkout_dir).await?;
        match outcome {
            PullOutcome::UpToDate => {
                info!("[{}] Already up to date.", job.alias);
                return Ok(outcome);
            }
            PullOutcome::Changed => match &job.target {
                Some(target) => info!("[{}] Pulled latest \"{}\" branch.", job.alias, target),
                None => info!("[{}] Pulled latest commits.", job.alias),
            },
        }
        self.refresh_dependencies(job).await?;
        Ok(outcome)
    }

    pub async fn refresh_dependencies(&self, job: &AcquireJob) -> Result<()> {
        info!("[{}] Downloading dependencies...", job.alias);
        if let Err(e) = self.toolchain.fetch_dependencies(&job.source_dir).await {
            error!("[{}] Failed to update dependencies: {}", job.alias, e);
            return Err(e);
        }
        info!("[{}] Dependencies updated!", job.alias);
        Ok(())
    }
}
