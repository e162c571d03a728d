//! Fake collaborators shared by the plugin system tests.
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::plugin_system::git::{CheckoutOutcome, CloneOutcome, PullOutcome, SourceControl};
use crate::plugin_system::loader::{DynamicLoader, SymbolTable};
use crate::plugin_system::registry::PluginRegistry;
use crate::plugin_system::toolchain::{TestOutcome, Toolchain};

/// Generates a module holding an in-process plugin whose lifecycle
/// functions bump per-module counters.
macro_rules! counting_plugin {
    ($name:ident) => {
        counting_plugin!($name, backend = None);
    };
    ($name:ident, backend = $backend:expr) => {
        mod $name {
            #[allow(unused_imports)]
            use super::*;
            use kiln_plugin::{Backend, BackendFn, CloseFn, Host, InitFn, LoadFn, PluginEnv, PluginResult};
            use std::sync::atomic::{AtomicUsize, Ordering};

            pub static INIT: AtomicUsize = AtomicUsize::new(0);
            pub static LOAD: AtomicUsize = AtomicUsize::new(0);
            pub static CLOSE: AtomicUsize = AtomicUsize::new(0);

            pub fn init(_env: &PluginEnv) -> PluginResult {
                INIT.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }

            pub fn load(_host: &dyn Host) -> PluginResult {
                LOAD.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }

            pub fn backend() -> Option<Backend> {
                $backend
            }

            pub fn close() -> PluginResult {
                CLOSE.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }

            pub fn symbols() -> Vec<(&'static str, usize)> {
                vec![
                    ("Init", (init as InitFn) as usize),
                    ("Load", (load as LoadFn) as usize),
                    ("Backend", (backend as BackendFn) as usize),
                    ("Close", (close as CloseFn) as usize),
                ]
            }
        }
    };
}

/// A canned response for one git call.
pub enum Scripted<T> {
    Ok(T),
    Fail(&'static str),
}

impl<T> Scripted<T> {
    fn into_result(self, operation: &str) -> Result<T> {
        match self {
            Scripted::Ok(value) => Ok(value),
            Scripted::Fail(diagnostics) => Err(Error::Tool {
                program: "git".to_string(),
                operation: operation.to_string(),
                diagnostics: diagnostics.to_string(),
            }),
        }
    }
}

/// Source control that replays scripted outcomes and logs every call.
///
/// Unscripted calls succeed: clones create the directory, checkouts report
/// `AlreadyOn` and pulls report `UpToDate`.
#[derive(Default)]
pub struct FakeSourceControl {
    calls: Mutex<Vec<String>>,
    clones: Mutex<VecDeque<Scripted<CloneOutcome>>>,
    fetches: Mutex<VecDeque<Scripted<()>>>,
    checkouts: Mutex<VecDeque<Scripted<CheckoutOutcome>>>,
    pulls: Mutex<VecDeque<Scripted<PullOutcome>>>,
}

impl FakeSourceControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_clone(self, outcome: Scripted<CloneOutcome>) -> Self {
        self.clones.lock().unwrap().push_back(outcome);
        self
    }

    pub fn on_fetch_tags(self, outcome: Scripted<()>) -> Self {
        self.fetches.lock().unwrap().push_back(outcome);
        self
    }

    pub fn on_checkout(self, outcome: Scripted<CheckoutOutcome>) -> Self {
        self.checkouts.lock().unwrap().push_back(outcome);
        self
    }

    pub fn on_pull(self, outcome: Scripted<PullOutcome>) -> Self {
        self.pulls.lock().unwrap().push_back(outcome);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl SourceControl for FakeSourceControl {
    async fn clone_repository(&self, url: &str, dir: &Path) -> Result<CloneOutcome> {
        self.log(format!("clone {}", url));
        let scripted = self.clones.lock().unwrap().pop_front();
        let outcome = scripted.unwrap_or(Scripted::Ok(CloneOutcome::Cloned)).into_result("clone")?;
        if outcome == CloneOutcome::Cloned {
            std::fs::create_dir_all(dir).unwrap();
        }
        Ok(outcome)
    }

    async fn fetch_tags(&self, _dir: &Path) -> Result<()> {
        self.log("fetch_tags".to_string());
        let scripted = self.fetches.lock().unwrap().pop_front();
        scripted.unwrap_or(Scripted::Ok(())).into_result("fetch")
    }

    async fn checkout(&self, _dir: &Path, target: &str) -> Result<CheckoutOutcome> {
        self.log(format!("checkout {}", target));
        let scripted = self.checkouts.lock().unwrap().pop_front();
        scripted
            .unwrap_or(Scripted::Ok(CheckoutOutcome::AlreadyOn))
            .into_result("checkout")
    }

    async fn pull(&self, _dir: &Path) -> Result<PullOutcome> {
        self.log("pull".to_string());
        let scripted = self.pulls.lock().unwrap().pop_front();
        scripted.unwrap_or(Scripted::Ok(PullOutcome::UpToDate)).into_result("pull")
    }
}

/// Toolchain that writes a placeholder artifact on build, fails for chosen
/// source directories and tracks how many builds run at once.
#[derive(Default)]
pub struct FakeToolchain {
    calls: Mutex<Vec<String>>,
    failing_builds: Mutex<HashSet<PathBuf>>,
    failing_tests: Mutex<HashSet<PathBuf>>,
    empty_suites: Mutex<HashSet<PathBuf>>,
    fail_fetch: Mutex<bool>,
    build_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_build(self, source_dir: impl Into<PathBuf>) -> Self {
        self.failing_builds.lock().unwrap().insert(source_dir.into());
        self
    }

    pub fn fail_tests(self, source_dir: impl Into<PathBuf>) -> Self {
        self.failing_tests.lock().unwrap().insert(source_dir.into());
        self
    }

    pub fn without_tests(self, source_dir: impl Into<PathBuf>) -> Self {
        self.empty_suites.lock().unwrap().insert(source_dir.into());
        self
    }

    pub fn fail_fetch(self) -> Self {
        *self.fail_fetch.lock().unwrap() = true;
        self
    }

    pub fn build_delay(self, delay: Duration) -> Self {
        *self.build_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn fetch_dependencies(&self, source_dir: &Path) -> Result<()> {
        self.log(format!("fetch {}", source_dir.display()));
        if *self.fail_fetch.lock().unwrap() {
            return Err(Error::Tool {
                program: "cargo".to_string(),
                operation: "fetch".to_string(),
                diagnostics: "network unreachable".to_string(),
            });
        }
        Ok(())
    }

    async fn build(&self, source_dir: &Path, artifact: &Path) -> Result<()> {
        self.log(format!("build {}", source_dir.display()));
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = *self.build_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_builds.lock().unwrap().contains(source_dir) {
            return Err(Error::Tool {
                program: "cargo".to_string(),
                operation: "build".to_string(),
                diagnostics: format!("could not compile {}", source_dir.display()),
            });
        }
        std::fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        std::fs::write(artifact, b"artifact").unwrap();
        Ok(())
    }

    async fn run_tests(&self, source_dir: &Path) -> Result<TestOutcome> {
        self.log(format!("test {}", source_dir.display()));
        if self.failing_tests.lock().unwrap().contains(source_dir) {
            return Err(Error::TestsFailed {
                diagnostics: "test result: FAILED. 0 passed; 1 failed".to_string(),
            });
        }
        if self.empty_suites.lock().unwrap().contains(source_dir) {
            return Ok(TestOutcome::NoTests);
        }
        Ok(TestOutcome::Passed)
    }
}

type SymbolFactory = fn() -> Vec<(&'static str, usize)>;

/// Loader serving in-process symbol tables keyed by artifact path.
#[derive(Default)]
pub struct StaticLoader {
    tables: Mutex<HashMap<PathBuf, SymbolFactory>>,
    loads: AtomicUsize,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, artifact: impl Into<PathBuf>, symbols: SymbolFactory) -> Self {
        self.tables.lock().unwrap().insert(artifact.into(), symbols);
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl DynamicLoader for StaticLoader {
    fn load(&self, artifact: &Path, _search_paths: &[PathBuf]) -> Result<SymbolTable> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let factory = self.tables.lock().unwrap().get(artifact).copied();
        match factory {
            Some(factory) => Ok(SymbolTable::from_static(artifact, factory())),
            None => Err(Error::LoadFailed {
                path: artifact.to_path_buf(),
                message: "no such table".to_string(),
            }),
        }
    }
}

/// Collaborators of a registry under test, kept so tests can inspect them.
pub struct Harness {
    pub registry: PluginRegistry,
    pub git: Arc<FakeSourceControl>,
    pub toolchain: Arc<FakeToolchain>,
    pub loader: Arc<StaticLoader>,
}

pub fn harness(root: &Path, git: FakeSourceControl, toolchain: FakeToolchain, loader: StaticLoader) -> Harness {
    let git = Arc::new(git);
    let toolchain = Arc::new(toolchain);
    let loader = Arc::new(loader);
    let registry = PluginRegistry::builder(root)
        .source_control(git.clone())
        .toolchain(toolchain.clone())
        .loader(loader.clone())
        .build()
        .unwrap();
    Harness {
        registry,
        git,
        toolchain,
        loader,
    }
}

/// Artifact path the registry assigns to `alias` under `root`.
pub fn artifact(root: &Path, alias: &str) -> PathBuf {
    root.join(format!("{}.{}", alias, crate::constants::ARTIFACT_EXTENSION))
}
