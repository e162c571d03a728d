//! Build/test toolchain collaborator.
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use tokio::process::Command;

use crate::constants::TEST_PASS_MARKER;
use crate::error::{Error, Result};
use crate::plugin_system::git::tool_error;
use crate::utils::copy_artifact;

/// Result of a test run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    /// The suite ran but contained no tests.
    NoTests,
}

#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Download the dependencies of the crate in `source_dir`.
    async fn fetch_dependencies(&self, source_dir: &Path) -> Result<()>;

    /// Build the crate in `source_dir` and place the library at `artifact`.
    async fn build(&self, source_dir: &Path, artifact: &Path) -> Result<()>;

    /// Run the test suite of the crate in `source_dir`.
    async fn run_tests(&self, source_dir: &Path) -> Result<TestOutcome>;
}

/// Classify the output of a test run that exited successfully.
///
/// Passing requires both the pass marker and at least one suite that ran a
/// nonzero number of tests.
pub fn classify_test_output(stdout: &str, pass_marker: &str) -> TestOutcome {
    let ran_tests = stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix("running "))
        .filter_map(|rest| rest.split_whitespace().next())
        .filter_map(|count| count.parse::<usize>().ok())
        .any(|count| count > 0);

    if stdout.contains(pass_marker) && ran_tests {
        TestOutcome::Passed
    } else {
        TestOutcome::NoTests
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    package: Option<PackageSection>,
    lib: Option<LibSection>,
}

#[derive(Debug, Deserialize)]
struct PackageSection {
    name: String,
}

#[derive(Debug, Deserialize)]
struct LibSection {
    name: Option<String>,
}

/// Library target name declared by a `Cargo.toml`.
pub fn library_name(manifest: &str) -> std::result::Result<String, String> {
    let manifest: Manifest = toml::from_str(manifest).map_err(|e| e.to_string())?;
    if let Some(name) = manifest.lib.and_then(|lib| lib.name) {
        return Ok(name);
    }
    manifest
        .package
        .map(|package| package.name.replace('-', "_"))
        .ok_or_else(|| "no [package] or [lib] name".to_string())
}

/// [`Toolchain`] backed by `cargo`.
#[derive(Debug, Clone)]
pub struct CargoToolchain {
    program: String,
    release: bool,
    pass_marker: String,
    target_dir: Option<PathBuf>,
}

impl Default for CargoToolchain {
    fn default() -> Self {
        Self {
            program: "cargo".to_string(),
            release: false,
            pass_marker: TEST_PASS_MARKER.to_string(),
            target_dir: None,
        }
    }
}

impl CargoToolchain {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn release(mut self, release: bool) -> Self {
        self.release = release;
        self
    }

    pub fn pass_marker(mut self, marker: impl Into<String>) -> Self {
        self.pass_marker = marker.into();
        self
    }

    /// Share one target directory between every build.
    pub fn target_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.target_dir = Some(dir.into());
        self
    }

    fn profile_dir(&self) -> &'static str {
        if self.release { "release" } else { "debug" }
    }

    async fn run(&self, operation: &str, dir: &Path, args: &[&str]) -> Result<Output> {
        debug!("Running {} {} in {}", self.program, args.join(" "), dir.display());
        Command::new(&self.program)
            .args(args)
            .current_dir(dir)
            .output()
            .await
            .map_err(|e| Error::Tool {
                program: self.program.clone(),
                operation: operation.to_string(),
                diagnostics: e.to_string(),
            })
    }

    async fn built_library(&self, source_dir: &Path, target_dir: &Path) -> Result<PathBuf> {
        let manifest_path = source_dir.join("Cargo.toml");
        let manifest = tokio::fs::read_to_string(&manifest_path)
            .await
            .map_err(|e| Error::io(e, "read crate manifest", &manifest_path))?;
        let name = library_name(&manifest).map_err(|message| Error::Config {
            path: manifest_path.clone(),
            message,
        })?;
        Ok(target_dir
            .join(self.profile_dir())
            .join(format!("{}{}{}", DLL_PREFIX, name, DLL_SUFFIX)))
    }
}

#[async_trait]
impl Toolchain for CargoToolchain {
    async fn fetch_dependencies(&self, source_dir: &Path) -> Result<()> {
        let output = self.run("fetch", source_dir, &["fetch"]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(tool_error(&self.program, "fetch", &String::from_utf8_lossy(&output.stderr)))
        }
    }

    async fn build(&self, source_dir: &Path, artifact: &Path) -> Result<()> {
        let target_dir = self
            .target_dir
            .clone()
            .unwrap_or_else(|| source_dir.join("target"));
        let target = target_dir.to_string_lossy();

        let mut args = vec!["build", "--lib"];
        if self.release {
            args.push("--release");
        }
        args.extend(["--target-dir", target.as_ref()]);

        let output = self.run("build", source_dir, &args).await?;
        // Progress goes to stderr, so only the exit status decides.
        if !output.status.success() {
            return Err(tool_error(&self.program, "build", &String::from_utf8_lossy(&output.stderr)));
        }

        let library = self.built_library(source_dir, &target_dir).await?;
        copy_artifact(&library, artifact).await
    }

    async fn run_tests(&self, source_dir: &Path) -> Result<TestOutcome> {
        let target = self.target_dir.as_ref().map(|dir| dir.to_string_lossy());
        let mut args = vec!["test"];
        if let Some(target) = &target {
            args.extend(["--target-dir", target.as_ref()]);
        }

        let output = self.run("test", source_dir, &args).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::TestsFailed {
                diagnostics: format!("{}{}", stdout, stderr).trim().to_string(),
            });
        }
        Ok(classify_test_output(&stdout, &self.pass_marker))
    }
}
