//! # Kiln Core Errors
//!
//! Defines [`Error`], the single error enum of the orchestrator, and the
//! [`Result`] shorthand.
//!
//! Errors fall into a few families: parse errors (malformed handler keys,
//! unsupported sources), resolution errors, external tool failures, load
//! failures, lookup/binding errors and lifecycle errors. Anything that goes
//! wrong while a batch operation works on one plugin is wrapped in
//! [`Error::Plugin`], which names the plugin alias and the [`Phase`].
use std::fmt;
use std::path::PathBuf;
use std::result::Result as StdResult;
use std::sync::Mutex;

use kiln_plugin::PluginError;
use thiserror::Error as ThisError;

/// Lifecycle phase in which a per-plugin error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Source acquisition (clone, checkout, pull, dependency download).
    Acquire,
    /// Toolchain build.
    Build,
    /// Toolchain test run.
    Test,
    /// Loading the artifact into the process.
    Load,
    /// The plugin's `Init` callback.
    Init,
    /// The plugin's `Load` callback, which links it to its siblings.
    Link,
    /// The plugin's `Close` callback.
    Close,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Acquire => "acquire",
            Phase::Build => "build",
            Phase::Test => "test",
            Phase::Load => "load",
            Phase::Init => "init",
            Phase::Link => "link",
            Phase::Close => "close",
        };
        f.write_str(name)
    }
}

#[derive(Debug, ThisError)]
pub enum Error {
    // --- Parse errors ---
    #[error("expected ending parenthesis in handler key '{key}'")]
    MalformedCall { key: String },

    #[error("plugin source not supported: {key}")]
    UnsupportedSource { key: String },

    // --- Resolution errors ---
    #[error("invalid plugin reference '{key}': {message}")]
    InvalidReference { key: String, message: String },

    #[error("invalid directory, cannot be empty")]
    InvalidDir,

    // --- External tools ---
    #[error("{program} {operation} failed: {diagnostics}")]
    Tool {
        program: String,
        operation: String,
        diagnostics: String,
    },

    #[error("tests failed:\n{diagnostics}")]
    TestsFailed { diagnostics: String },

    #[error("artifact '{}' has not been built", path.display())]
    NotBuilt { path: PathBuf },

    // --- Loading ---
    #[error("unable to load artifact '{}': {message}", path.display())]
    LoadFailed { path: PathBuf, message: String },

    // --- Lookup and binding ---
    #[error("symbol '{symbol}' was not found within this plugin")]
    SymbolNotFound { symbol: String },

    #[error("plugin '{alias}' has not been loaded")]
    NotLoaded { alias: String },

    #[error("plugin '{alias}' does not expose a backend")]
    NoBackend { alias: String },

    #[error("invalid type, expected {expected} and received {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    // --- Lifecycle ---
    #[error("plugin cannot be added, alias '{alias}' already exists")]
    DuplicateAlias { alias: String },

    #[error("plugin registry is closed")]
    Closed,

    // --- Plugin callbacks ---
    #[error("{operation} returned an error: {source}")]
    Callback {
        operation: &'static str,
        #[source]
        source: PluginError,
    },

    #[error("{operation} panicked: {message}")]
    Panicked {
        operation: &'static str,
        message: String,
    },

    /// A failure tied to one plugin during a batch operation.
    #[error("{phase} failed for plugin '{alias}': {source}")]
    Plugin {
        alias: String,
        phase: Phase,
        #[source]
        source: Box<Error>,
    },

    /// Every error collected by an operation that does not fail fast.
    #[error("{}", join_errors(.0))]
    Multiple(Vec<Error>),

    // --- Storage & config ---
    #[error("I/O error during '{operation}' on '{}': {source}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
        operation: String,
    },

    #[error("configuration error in '{}': {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Shorthand for Result with our Error type
pub type Result<T> = StdResult<T, Error>;

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Helper to create an I/O error with context.
    pub fn io(source: std::io::Error, operation: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Error::Io {
            source,
            operation: operation.into(),
            path: path.into(),
        }
    }

    /// Wrap this error with the plugin and phase it belongs to.
    pub fn in_plugin(self, alias: impl Into<String>, phase: Phase) -> Self {
        Error::Plugin {
            alias: alias.into(),
            phase,
            source: Box::new(self),
        }
    }

    /// Alias and phase of a [`Error::Plugin`] error.
    pub fn plugin_context(&self) -> Option<(&str, Phase)> {
        match self {
            Error::Plugin { alias, phase, .. } => Some((alias.as_str(), *phase)),
            _ => None,
        }
    }
}

/// Thread-safe list of errors pushed by concurrent tasks.
#[derive(Debug, Default)]
pub struct ErrorList {
    errors: Mutex<Vec<Error>>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the error of a failed result; successes are ignored.
    pub fn push(&self, result: Result<()>) {
        if let Err(e) = result {
            self.push_error(e);
        }
    }

    pub fn push_error(&self, error: Error) {
        // A poisoned lock still holds every error pushed so far.
        let mut errors = self.errors.lock().unwrap_or_else(|p| p.into_inner());
        errors.push(error);
    }

    pub fn len(&self) -> usize {
        self.errors.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Ok(())` when empty, the single error when there is one, otherwise
    /// [`Error::Multiple`].
    pub fn into_result(self) -> Result<()> {
        let mut errors = self.errors.into_inner().unwrap_or_else(|p| p.into_inner());
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Multiple(errors)),
        }
    }
}
