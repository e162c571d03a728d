//! Source classification and the canonical on-disk layout.
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{ARTIFACT_EXTENSION, ARTIFACT_EXTENSIONS, LOCAL_MARKERS, SOURCES_DIR_NAME};
use crate::error::{Error, Result};

/// Where a plugin comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A prebuilt shared library, used verbatim.
    LocalArtifact(PathBuf),
    /// A source tree on the local filesystem, built in place.
    LocalSource(PathBuf),
    /// A remote repository reference.
    Repository(RepoRef),
}

impl Source {
    pub fn kind(&self) -> SourceKind {
        match self {
            Source::LocalArtifact(_) | Source::LocalSource(_) => SourceKind::Local,
            Source::Repository(_) => SourceKind::Repository,
        }
    }

    pub fn repository(&self) -> Option<&RepoRef> {
        match self {
            Source::Repository(repo) => Some(repo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Local,
    Repository,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Local => f.write_str("local"),
            SourceKind::Repository => f.write_str("repository"),
        }
    }
}

/// A parsed `host/user/repo[/subdir...][@version|#branch]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    /// Host name, with the port when the reference names one.
    pub host: String,
    pub user: String,
    pub repo: String,
    /// Path segments below the repository root.
    pub subpath: Vec<String>,
    pub version: Option<String>,
    pub branch: Option<String>,
}

impl RepoRef {
    /// `host[:port]/user/repo`, the unit that gets cloned.
    pub fn repository(&self) -> String {
        format!("{}/{}/{}", self.host, self.user, self.repo)
    }

    /// Normalized URL without version or branch markers.
    pub fn path(&self) -> String {
        let mut path = self.repository();
        for segment in &self.subpath {
            path.push('/');
            path.push_str(segment);
        }
        path
    }

    /// The pinned version if one was given, otherwise the branch.
    pub fn target(&self) -> Option<&str> {
        self.version.as_deref().or(self.branch.as_deref())
    }

    pub fn clone_url(&self, scheme: &str) -> String {
        format!("{}://{}", scheme, self.repository())
    }

    /// Directory holding the clone of the repository.
    pub fn checkout_dir(&self, source_root: &Path) -> PathBuf {
        source_root.join(&self.host).join(&self.user).join(&self.repo)
    }

    /// Directory the plugin is built from.
    pub fn source_dir(&self, source_root: &Path) -> PathBuf {
        self.subpath
            .iter()
            .fold(self.checkout_dir(source_root), |dir, segment| dir.join(segment))
    }

    /// Identity used to visit each repository once per retrieve.
    pub fn dedupe_key(&self, strategy: DedupeStrategy) -> String {
        match strategy {
            DedupeStrategy::Repository => self.repository(),
            DedupeStrategy::FullPath => self.path(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())?;
        match (&self.version, &self.branch) {
            (Some(version), _) => write!(f, "@{}", version),
            (None, Some(branch)) => write!(f, "#{}", branch),
            (None, None) => Ok(()),
        }
    }
}

/// How [`RepoRef`]s are grouped when deciding what to acquire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupeStrategy {
    /// First three path segments: plugins in subdirectories of one
    /// repository share a single acquisition.
    #[default]
    Repository,
    /// The full repository and subdirectory path.
    FullPath,
}

/// True for keys that refer to the local filesystem.
pub fn is_local(key: &str) -> bool {
    LOCAL_MARKERS.iter().any(|marker| key.starts_with(marker)) || has_artifact_extension(key)
}

/// True if the path ends in a recognized shared library extension.
pub fn has_artifact_extension(key: &str) -> bool {
    Path::new(key)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ARTIFACT_EXTENSIONS.contains(&ext))
}

/// Classify a plugin source (the part of a key before any alias).
pub fn classify_source(key: &str) -> Result<Source> {
    if is_local(key) {
        let path = PathBuf::from(key);
        return Ok(if has_artifact_extension(key) {
            Source::LocalArtifact(path)
        } else {
            Source::LocalSource(path)
        });
    }

    parse_repository(key).map(Source::Repository)
}

fn parse_repository(key: &str) -> Result<RepoRef> {
    let unsupported = || Error::UnsupportedSource { key: key.to_string() };

    let (locator, version) = match key.split_once('@') {
        Some((locator, version)) => (locator, Some(version)),
        None => (key, None),
    };
    // A version suffix wins over any branch fragment that follows it.
    let version = version
        .map(|v| v.split('#').next().unwrap_or_default())
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let locator = locator.split_once("://").map_or(locator, |(_, rest)| rest);
    let url = Url::parse(&format!("http://{}", locator)).map_err(|_| unsupported())?;

    let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(unsupported)?;
    let host = match authority_port(locator) {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let mut segments = url
        .path_segments()
        .map(|parts| parts.filter(|p| !p.is_empty()).map(str::to_string).collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter();

    let (user, repo) = match (segments.next(), segments.next()) {
        (Some(user), Some(repo)) => (user, repo),
        _ => return Err(unsupported()),
    };

    let branch = if version.is_none() {
        url.fragment().filter(|f| !f.is_empty()).map(str::to_string)
    } else {
        None
    };

    Ok(RepoRef {
        host,
        user,
        repo,
        subpath: segments.collect(),
        version,
        branch,
    })
}

/// Port written in the authority of `locator`. Read from the text because
/// the URL parser drops ports that are the default for its scheme.
fn authority_port(locator: &str) -> Option<&str> {
    let authority = locator.split(['/', '#']).next()?;
    let (_, port) = authority.rsplit_once(':')?;
    (!port.is_empty() && port.bytes().all(|b| b.is_ascii_digit())).then_some(port)
}

/// Canonical directories of a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root_dir: PathBuf,
    source_root: PathBuf,
}

impl Layout {
    /// Layout rooted at `root_dir`, caching clones in `<root_dir>/sources`.
    pub fn new(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let root_dir = root_dir.into();
        if root_dir.as_os_str().is_empty() {
            return Err(Error::InvalidDir);
        }
        let source_root = root_dir.join(SOURCES_DIR_NAME);
        Ok(Self { root_dir, source_root })
    }

    pub fn with_source_root(mut self, source_root: impl Into<PathBuf>) -> Self {
        self.source_root = source_root.into();
        self
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// `<root>/<alias>.<ext>`
    pub fn artifact_path(&self, alias: &str) -> PathBuf {
        self.root_dir.join(format!("{}.{}", alias, ARTIFACT_EXTENSION))
    }
}
