//! The per-plugin aggregate kept by the registry.
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::plugin_system::identifier::parse_key;
use crate::plugin_system::loader::LoadedPlugin;
use crate::plugin_system::source::{classify_source, Layout, RepoRef, Source, SourceKind};
use crate::utils::short_stem;

/// Lifecycle state of a record. States only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PluginState {
    Registered,
    SourceResolved,
    Acquired,
    Built,
    Tested,
    Loaded,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PluginState::Registered => "registered",
            PluginState::SourceResolved => "source-resolved",
            PluginState::Acquired => "acquired",
            PluginState::Built => "built",
            PluginState::Tested => "tested",
            PluginState::Loaded => "loaded",
        };
        f.write_str(name)
    }
}

pub struct PluginRecord {
    key: String,
    alias: String,
    source: Source,
    artifact: PathBuf,
    source_dir: Option<PathBuf>,
    update: bool,
    state: PluginState,
    loaded: Option<Arc<LoadedPlugin>>,
}

impl PluginRecord {
    /// Parse and resolve a plugin key against `layout`. Performs no I/O.
    pub fn resolve(key: &str, update: bool, layout: &Layout) -> Result<Self> {
        let (locator, alias) = parse_key(key);
        let source = classify_source(&locator)?;

        let alias = if alias.is_empty() { fallback_alias(&source) } else { alias };
        if alias.is_empty() {
            return Err(Error::InvalidReference {
                key: key.to_string(),
                message: "unable to derive a plugin alias".to_string(),
            });
        }

        let (artifact, source_dir) = match &source {
            Source::LocalArtifact(path) => (path.clone(), None),
            Source::LocalSource(path) => (layout.artifact_path(&alias), Some(path.clone())),
            Source::Repository(repo) => (
                layout.artifact_path(&alias),
                Some(repo.source_dir(layout.source_root())),
            ),
        };

        let mut record = Self {
            key: key.to_string(),
            alias,
            source,
            artifact,
            source_dir,
            update,
            state: PluginState::Registered,
            loaded: None,
        };
        record.advance(PluginState::SourceResolved);
        Ok(record)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn kind(&self) -> SourceKind {
        self.source.kind()
    }

    pub fn repository(&self) -> Option<&RepoRef> {
        self.source.repository()
    }

    pub fn is_prebuilt(&self) -> bool {
        matches!(self.source, Source::LocalArtifact(_))
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// Directory the plugin is built and tested from. `None` for prebuilt
    /// artifacts.
    pub fn source_dir(&self) -> Option<&Path> {
        self.source_dir.as_deref()
    }

    pub fn update(&self) -> bool {
        self.update
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    /// Branch or version to check out, `branch_override` taking precedence.
    pub fn target<'a>(&'a self, branch_override: Option<&'a str>) -> Option<&'a str> {
        branch_override
            .filter(|branch| !branch.is_empty())
            .or_else(|| self.repository().and_then(RepoRef::target))
    }

    /// Move to `state` unless the record is already past it.
    pub fn advance(&mut self, state: PluginState) {
        if state > self.state {
            self.state = state;
        }
    }

    pub fn loaded(&self) -> Option<&Arc<LoadedPlugin>> {
        self.loaded.as_ref()
    }

    pub(crate) fn set_loaded(&mut self, plugin: Arc<LoadedPlugin>) {
        self.loaded = Some(plugin);
        self.advance(PluginState::Loaded);
    }

    /// Snapshot of the record.
    pub fn info(&self) -> RecordInfo {
        RecordInfo {
            key: self.key.clone(),
            alias: self.alias.clone(),
            kind: self.kind(),
            repository: self.repository().map(RepoRef::path),
            target: self.repository().and_then(RepoRef::target).map(str::to_string),
            artifact: self.artifact.clone(),
            source_dir: self.source_dir.clone(),
            update: self.update,
            state: self.state,
        }
    }
}

fn fallback_alias(source: &Source) -> String {
    match source {
        Source::Repository(repo) => repo.repo.clone(),
        Source::LocalArtifact(path) | Source::LocalSource(path) => short_stem(path).unwrap_or_default(),
    }
}

impl fmt::Debug for PluginRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRecord")
            .field("key", &self.key)
            .field("alias", &self.alias)
            .field("source", &self.source)
            .field("artifact", &self.artifact)
            .field("state", &self.state)
            .finish()
    }
}

/// Read-only view of a [`PluginRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordInfo {
    pub key: String,
    pub alias: String,
    pub kind: SourceKind,
    /// Normalized repository URL, for repository plugins.
    pub repository: Option<String>,
    pub target: Option<String>,
    pub artifact: PathBuf,
    pub source_dir: Option<PathBuf>,
    pub update: bool,
    pub state: PluginState,
}
