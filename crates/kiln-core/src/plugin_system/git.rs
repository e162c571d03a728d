//! Source-control collaborator.
//!
//! [`SourceControl`] is the seam the acquisition engine talks to. [`GitCli`]
//! drives the `git` executable; the classification of its output lives in the
//! pure `classify_*` functions so it can be tested without a repository.
use std::path::Path;
use std::process::Output;

use async_trait::async_trait;
use log::debug;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Result of a clone attempt that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneOutcome {
    Cloned,
    /// The remote repository does not exist. Carries the diagnostic text.
    Missing(String),
}

/// Result of a successful checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// The working tree already tracked the requested branch.
    AlreadyOn,
    /// Switched to another branch.
    Switched,
    /// HEAD detached at a tag or commit.
    Detached,
}

impl CheckoutOutcome {
    /// Whether the checkout is pinned and must not be pulled.
    pub fn is_pinned(self) -> bool {
        matches!(self, CheckoutOutcome::Detached)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    UpToDate,
    Changed,
}

#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Clone `url` into `dir`.
    async fn clone_repository(&self, url: &str, dir: &Path) -> Result<CloneOutcome>;

    /// Fetch every tag of the remote, overwriting local ones.
    async fn fetch_tags(&self, dir: &Path) -> Result<()>;

    /// Check out a branch, tag or commit.
    async fn checkout(&self, dir: &Path, target: &str) -> Result<CheckoutOutcome>;

    /// Pull the current branch.
    async fn pull(&self, dir: &Path) -> Result<PullOutcome>;
}

const MISSING_REMOTE_MARKERS: [&str; 3] = ["no such file or directory", "not found", "does not exist"];

/// Classify the output of `git clone`.
pub fn classify_clone(success: bool, stderr: &str) -> Result<CloneOutcome> {
    if success {
        return Ok(CloneOutcome::Cloned);
    }
    let lowered = stderr.to_lowercase();
    if MISSING_REMOTE_MARKERS.iter().any(|m| lowered.contains(m)) {
        return Ok(CloneOutcome::Missing(stderr.trim().to_string()));
    }
    Err(tool_error("git", "clone", stderr))
}

/// Classify the output of `git checkout`.
///
/// Git reports the result on stderr. A recognized marker wins regardless of
/// the exit status; a successful run without one is treated as a switch when
/// something was printed.
pub fn classify_checkout(success: bool, stdout: &str, stderr: &str) -> Result<CheckoutOutcome> {
    let combined = format!("{}\n{}", stdout, stderr);
    if combined.contains("HEAD is now at") {
        return Ok(CheckoutOutcome::Detached);
    }
    if combined.contains("Already on") {
        return Ok(CheckoutOutcome::AlreadyOn);
    }
    if combined.contains("Switched to") {
        return Ok(CheckoutOutcome::Switched);
    }

    if success {
        return Ok(if stdout.trim().is_empty() {
            CheckoutOutcome::AlreadyOn
        } else {
            CheckoutOutcome::Switched
        });
    }
    Err(tool_error("git", "checkout", stderr))
}

/// Classify the output of `git pull`.
pub fn classify_pull(success: bool, stdout: &str, stderr: &str) -> Result<PullOutcome> {
    if !success {
        return Err(tool_error("git", "pull", stderr));
    }
    let lowered = stdout.to_lowercase();
    if lowered.contains("up to date") || lowered.contains("up-to-date") {
        Ok(PullOutcome::UpToDate)
    } else {
        Ok(PullOutcome::Changed)
    }
}

pub(crate) fn tool_error(program: &str, operation: &str, diagnostics: &str) -> Error {
    Error::Tool {
        program: program.to_string(),
        operation: operation.to_string(),
        diagnostics: diagnostics.trim().to_string(),
    }
}

/// [`SourceControl`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    async fn run(&self, operation: &str, dir: Option<&Path>, args: &[&str]) -> Result<Output> {
        let mut command = Command::new(&self.program);
        command.args(args);
        if let Some(dir) = dir {
            command.current_dir(dir);
        }
        debug!("Running {} {}", self.program, args.join(" "));

        command.output().await.map_err(|e| Error::Tool {
            program: self.program.clone(),
            operation: operation.to_string(),
            diagnostics: e.to_string(),
        })
    }
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[async_trait]
impl SourceControl for GitCli {
    async fn clone_repository(&self, url: &str, dir: &Path) -> Result<CloneOutcome> {
        if let Some(parent) = dir.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(e, "create clone parent", parent))?;
        }
        let target = dir.to_string_lossy();
        let output = self.run("clone", None, &["clone", url, &target]).await?;
        classify_clone(output.status.success(), &text(&output.stderr))
    }

    async fn fetch_tags(&self, dir: &Path) -> Result<()> {
        let output = self
            .run("fetch", Some(dir), &["fetch", "--tags", "--force"])
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(tool_error(&self.program, "fetch", &text(&output.stderr)))
        }
    }

    async fn checkout(&self, dir: &Path, target: &str) -> Result<CheckoutOutcome> {
        let output = self.run("checkout", Some(dir), &["checkout", target]).await?;
        classify_checkout(output.status.success(), &text(&output.stdout), &text(&output.stderr))
    }

    async fn pull(&self, dir: &Path) -> Result<PullOutcome> {
        let output = self.run("pull", Some(dir), &["pull"]).await?;
        classify_pull(output.status.success(), &text(&output.stdout), &text(&output.stderr))
    }
}
