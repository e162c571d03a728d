use std::path::PathBuf;
use std::sync::Arc;

use kiln_plugin::{Backend, Host, PluginEnv};
use log::{debug, error, info};
use tokio::sync::RwLock;

use crate::config::KilnConfig;
use crate::constants::DEFAULT_GIT_SCHEME;
use crate::error::{Error, ErrorList, Phase, Result};
use crate::plugin_system::acquire::{dedupe, AcquireJob, AcquireOutcome, AcquisitionEngine};
use crate::plugin_system::backend::bind_backend;
use crate::plugin_system::git::{GitCli, SourceControl};
use crate::plugin_system::identifier::{parse_handler_key, HandlerCall};
use crate::plugin_system::loader::{DynamicLoader, LibraryLoader, LoadedPlugin, Symbol};
use crate::plugin_system::queue::TaskQueue;
use crate::plugin_system::record::{PluginRecord, PluginState, RecordInfo};
use crate::plugin_system::runner::{BuildJob, Runner, StepOutcome};
use crate::plugin_system::source::{DedupeStrategy, Layout};
use crate::plugin_system::toolchain::{CargoToolchain, Toolchain};
use crate::utils::path_exists;

struct RegistryState {
    /// Records in registration order
    records: Vec<PluginRecord>,
    /// Branch applied to every repository plugin on retrieve
    branch: Option<String>,
    closed: bool,
}

impl RegistryState {
    fn ensure_open(&self) -> Result<()> {
        if self.closed { Err(Error::Closed) } else { Ok(()) }
    }

    fn loaded(&self, alias: &str) -> Result<Arc<LoadedPlugin>> {
        self.records
            .iter()
            .find(|record| record.alias() == alias)
            .and_then(|record| record.loaded().cloned())
            .ok_or_else(|| Error::NotLoaded {
                alias: alias.to_string(),
            })
    }

    fn loaded_plugins(&self) -> Vec<Arc<LoadedPlugin>> {
        self.records
            .iter()
            .filter_map(|record| record.loaded().cloned())
            .collect()
    }
}

/// Ordered, concurrency-safe collection of plugin records.
///
/// Batch operations (`register`, `retrieve`, `build`, `test`, `initialize`,
/// `start`, `close`) hold the write lock for their whole duration; lookups
/// take the read lock. Once closed, every operation fails with
/// [`Error::Closed`].
pub struct PluginRegistry {
    layout: Layout,
    dedupe: DedupeStrategy,
    search_paths: Vec<PathBuf>,
    acquirer: AcquisitionEngine,
    runner: Runner,
    loader: Arc<dyn DynamicLoader>,
    state: RwLock<RegistryState>,
}

/// Builder for [`PluginRegistry`], mainly to swap collaborators.
pub struct RegistryBuilder {
    root_dir: PathBuf,
    source_dir: Option<PathBuf>,
    branch: Option<String>,
    dedupe: DedupeStrategy,
    search_paths: Vec<PathBuf>,
    scheme: String,
    source_control: Option<Arc<dyn SourceControl>>,
    toolchain: Option<Arc<dyn Toolchain>>,
    loader: Option<Arc<dyn DynamicLoader>>,
}

impl RegistryBuilder {
    pub fn source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(dir.into());
        self
    }

    pub fn branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn dedupe(mut self, strategy: DedupeStrategy) -> Self {
        self.dedupe = strategy;
        self
    }

    pub fn search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    pub fn git_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn source_control(mut self, source_control: Arc<dyn SourceControl>) -> Self {
        self.source_control = Some(source_control);
        self
    }

    pub fn toolchain(mut self, toolchain: Arc<dyn Toolchain>) -> Self {
        self.toolchain = Some(toolchain);
        self
    }

    pub fn loader(mut self, loader: Arc<dyn DynamicLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Fails with [`Error::InvalidDir`] when the root directory is empty.
    pub fn build(self) -> Result<PluginRegistry> {
        let mut layout = Layout::new(self.root_dir)?;
        if let Some(source_dir) = self.source_dir {
            layout = layout.with_source_root(source_dir);
        }

        let source_control: Arc<dyn SourceControl> = match self.source_control {
            Some(source_control) => source_control,
            None => Arc::new(GitCli::default()),
        };
        let toolchain: Arc<dyn Toolchain> = match self.toolchain {
            Some(toolchain) => toolchain,
            None => Arc::new(CargoToolchain::default()),
        };
        let loader: Arc<dyn DynamicLoader> = match self.loader {
            Some(loader) => loader,
            None => Arc::new(LibraryLoader),
        };

        Ok(PluginRegistry {
            layout,
            dedupe: self.dedupe,
            search_paths: self.search_paths,
            acquirer: AcquisitionEngine::new(source_control, Arc::clone(&toolchain), self.scheme),
            runner: Runner::new(toolchain),
            loader,
            state: RwLock::new(RegistryState {
                records: Vec::new(),
                branch: self.branch,
                closed: false,
            }),
        })
    }
}

impl PluginRegistry {
    /// A registry rooted at `root_dir` with the default collaborators.
    pub fn new(root_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::builder(root_dir).build()
    }

    pub fn builder(root_dir: impl Into<PathBuf>) -> RegistryBuilder {
        RegistryBuilder {
            root_dir: root_dir.into(),
            source_dir: None,
            branch: None,
            dedupe: DedupeStrategy::default(),
            search_paths: Vec::new(),
            scheme: DEFAULT_GIT_SCHEME.to_string(),
            source_control: None,
            toolchain: None,
            loader: None,
        }
    }

    /// Build a registry from configuration and register every configured
    /// plugin.
    pub async fn from_config(config: &KilnConfig) -> Result<Self> {
        let mut toolchain = CargoToolchain::new(config.cargo.program.clone())
            .release(config.cargo.release)
            .pass_marker(config.cargo.pass_marker.clone());
        if let Some(target_dir) = &config.cargo.target_dir {
            toolchain = toolchain.target_dir(target_dir.clone());
        }

        let mut builder = Self::builder(config.root_dir.clone())
            .branch(config.branch.clone())
            .dedupe(config.dedupe)
            .search_paths(config.search_paths.clone())
            .git_scheme(config.git.scheme.clone())
            .source_control(Arc::new(GitCli::new(config.git.program.clone())))
            .toolchain(Arc::new(toolchain));
        if let Some(source_dir) = &config.source_dir {
            builder = builder.source_dir(source_dir.clone());
        }

        let registry = builder.build()?;
        for entry in &config.plugins {
            registry.register(&entry.key, entry.update).await?;
        }
        Ok(registry)
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Parse and resolve a plugin key and append its record. Performs no I/O.
    ///
    /// Returns the alias the plugin is known by.
    pub async fn register(&self, key: &str, update: bool) -> Result<String> {
        let mut state = self.state.write().await;
        state.ensure_open()?;

        let record = PluginRecord::resolve(key, update, &self.layout)?;
        if state.records.iter().any(|r| r.alias() == record.alias()) {
            return Err(Error::DuplicateAlias {
                alias: record.alias().to_string(),
            });
        }

        let alias = record.alias().to_string();
        debug!("[{}] Registered {} ({})", alias, key, record.kind());
        state.records.push(record);
        Ok(alias)
    }

    /// Branch applied to every repository plugin by later retrieves.
    pub async fn set_branch(&self, branch: Option<String>) -> Result<()> {
        let mut state = self.state.write().await;
        state.ensure_open()?;
        state.branch = branch.filter(|b| !b.is_empty());
        Ok(())
    }

    /// Clone or update every repository once, in registration order. The
    /// first fatal error aborts.
    pub async fn retrieve(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.ensure_open()?;

        let branch = state.branch.clone();
        for index in dedupe(&state.records, self.dedupe) {
            let record = &state.records[index];
            let Some(job) = AcquireJob::for_record(record, &self.layout, branch.as_deref()) else {
                continue;
            };

            let outcome = self
                .acquirer
                .acquire(&job)
                .await
                .map_err(|e| e.in_plugin(&job.alias, Phase::Acquire))?;
            if outcome == AcquireOutcome::Missing {
                continue;
            }

            // Every record of the repository shares the clone.
            let key = job.repo.dedupe_key(self.dedupe);
            for record in state.records.iter_mut() {
                if record.repository().is_some_and(|r| r.dedupe_key(self.dedupe) == key) {
                    record.advance(PluginState::Acquired);
                }
            }
        }
        Ok(())
    }

    /// Build every plugin in order, stopping at the first failure.
    pub async fn build(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.ensure_open()?;

        for record in state.records.iter_mut() {
            let job = BuildJob::for_record(record);
            self.runner
                .build(&job)
                .await
                .map_err(|e| e.in_plugin(&job.alias, Phase::Build))?;
            record.advance(PluginState::Built);
        }
        Ok(())
    }

    /// Build every plugin on `queue`, collecting every failure.
    pub async fn build_async(&self, queue: &TaskQueue) -> Result<()> {
        let mut state = self.state.write().await;
        state.ensure_open()?;

        let handles = state
            .records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                let job = BuildJob::for_record(record);
                let runner = self.runner.clone();
                queue.spawn(async move {
                    runner
                        .build(&job)
                        .await
                        .map(|_| index)
                        .map_err(|e| e.in_plugin(&job.alias, Phase::Build))
                })
            })
            .collect();

        let (built, errors) = TaskQueue::join(handles).await;
        for index in built {
            state.records[index].advance(PluginState::Built);
        }
        errors.into_result()
    }

    /// Test every plugin in order, stopping at the first failure.
    pub async fn test(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.ensure_open()?;

        for record in state.records.iter_mut() {
            let job = BuildJob::for_record(record);
            let outcome = self
                .runner
                .test(&job)
                .await
                .map_err(|e| e.in_plugin(&job.alias, Phase::Test))?;
            if outcome == StepOutcome::Done {
                record.advance(PluginState::Tested);
            }
        }
        Ok(())
    }

    /// Test every plugin on `queue`, collecting every failure.
    pub async fn test_async(&self, queue: &TaskQueue) -> Result<()> {
        let mut state = self.state.write().await;
        state.ensure_open()?;

        let handles = state
            .records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                let job = BuildJob::for_record(record);
                let runner = self.runner.clone();
                queue.spawn(async move {
                    runner
                        .test(&job)
                        .await
                        .map(|outcome| (index, outcome))
                        .map_err(|e| e.in_plugin(&job.alias, Phase::Test))
                })
            })
            .collect();

        let (tested, errors) = TaskQueue::join(handles).await;
        for (index, outcome) in tested {
            if outcome == StepOutcome::Done {
                state.records[index].advance(PluginState::Tested);
            }
        }
        errors.into_result()
    }

    /// Load every built plugin into the process. Plugins already loaded are
    /// kept; the first failure aborts.
    pub async fn initialize(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.ensure_open()?;

        for record in state.records.iter_mut() {
            if record.loaded().is_some() {
                continue;
            }
            let alias = record.alias().to_string();

            let built = record.state() >= PluginState::Built || path_exists(record.artifact()).await;
            if !built {
                return Err(Error::NotBuilt {
                    path: record.artifact().to_path_buf(),
                }
                .in_plugin(alias, Phase::Load));
            }

            let symbols = self
                .loader
                .load(record.artifact(), &self.search_paths)
                .map_err(|e| e.in_plugin(&alias, Phase::Load))?;
            info!("[{}] Loaded {}", alias, symbols.origin().display());
            record.set_loaded(Arc::new(LoadedPlugin::new(alias, symbols)));
        }
        Ok(())
    }

    /// Call `Init(env)` on every loaded plugin, then `Load(host)`, where the
    /// host exposes the loaded plugins. Fails fast.
    pub async fn start(&self, env: &PluginEnv) -> Result<()> {
        let state = self.state.write().await;
        state.ensure_open()?;

        let plugins = state.loaded_plugins();
        for plugin in &plugins {
            plugin.init(env).map_err(|e| e.in_plugin(plugin.alias(), Phase::Init))?;
        }

        let host = RegistryHost { plugins: plugins.clone() };
        for plugin in &plugins {
            plugin
                .link(&host)
                .map_err(|e| e.in_plugin(plugin.alias(), Phase::Link))?;
        }
        Ok(())
    }

    /// A loaded plugin by alias.
    pub async fn get(&self, alias: &str) -> Result<Arc<LoadedPlugin>> {
        let state = self.state.read().await;
        state.ensure_open()?;
        state.loaded(alias)
    }

    /// Bind the backend of plugin `alias` to `destination`.
    pub async fn backend<C>(&self, alias: &str, destination: &mut Option<Arc<C>>) -> Result<()>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        let plugin = self.get(alias).await?;
        let backend = plugin.backend()?.ok_or_else(|| Error::NoBackend {
            alias: alias.to_string(),
        })?;
        bind_backend(&backend, destination)
    }

    /// Parse a handler key and look up the method symbol in its plugin.
    pub async fn resolve_handler(&self, handler_key: &str) -> Result<(HandlerCall, Symbol)> {
        let call = parse_handler_key(handler_key)?;
        let plugin = self.get(&call.alias).await?;
        let symbol = plugin.lookup(&call.method)?;
        Ok((call, symbol))
    }

    /// Snapshot of every record in registration order.
    pub async fn records(&self) -> Result<Vec<RecordInfo>> {
        let state = self.state.read().await;
        state.ensure_open()?;
        Ok(state.records.iter().map(PluginRecord::info).collect())
    }

    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    /// Call `Close` on every loaded plugin and mark the registry closed.
    ///
    /// Every plugin is closed even when some fail; the failures are returned
    /// together. Calling `close` twice fails with [`Error::Closed`].
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.ensure_open()?;

        let errors = ErrorList::new();
        for plugin in state.loaded_plugins() {
            if let Err(e) = plugin.close() {
                error!(
                    "error closing {} ({}): {}",
                    plugin.alias(),
                    plugin.artifact().display(),
                    e
                );
                errors.push_error(e.in_plugin(plugin.alias(), Phase::Close));
            }
        }

        state.closed = true;
        errors.into_result()
    }
}

/// The [`Host`] handed to each plugin's `Load`: a snapshot of the loaded
/// plugins, so callbacks never touch the registry lock.
struct RegistryHost {
    plugins: Vec<Arc<LoadedPlugin>>,
}

impl Host for RegistryHost {
    fn aliases(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.alias().to_string()).collect()
    }

    fn backend(&self, alias: &str) -> Option<Backend> {
        let plugin = self.plugins.iter().find(|p| p.alias() == alias)?;
        match plugin.backend() {
            Ok(backend) => backend,
            Err(e) => {
                error!("[{}] Backend failed: {}", alias, e);
                None
            }
        }
    }
}
