//! # Dynamic Loader Adapter
//!
//! Turns a built artifact into a [`SymbolTable`] and the symbols in it into
//! typed handles.
//!
//! Symbols are looked up by exact name and handed out as untyped
//! [`Symbol`] addresses. Reinterpreting an address as a function pointer is
//! only sound when the symbol really has that signature, so every typed view
//! is `unsafe`. The four lifecycle entry points are reinterpreted exactly once,
//! when a [`LoadedPlugin`] is created, and called through [`EntryPoints`]
//! afterwards.
use std::any::Any;
use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use kiln_plugin::{symbols, Backend, BackendFn, CloseFn, Host, InitFn, LoadFn, PluginEnv, PluginResult};
use libloading::Library;
use log::debug;

use crate::error::{Error, Result};

/// `fn() -> Box<dyn Any + Send + Sync>`: a symbol producing a value.
pub type ValueFn = fn() -> Box<dyn Any + Send + Sync>;
/// `fn() -> PluginResult`: a procedure that may fail.
pub type FallibleFn = fn() -> PluginResult;

/// Non-null address of a symbol inside a loaded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol(NonZeroUsize);

impl Symbol {
    pub fn from_address(address: usize) -> Option<Self> {
        NonZeroUsize::new(address).map(Symbol)
    }

    pub fn address(&self) -> usize {
        self.0.get()
    }

    /// View the symbol as `fn()`.
    ///
    /// # Safety
    /// The symbol must be a Rust-ABI function taking no arguments and
    /// returning nothing. Any other symbol is undefined behaviour to call.
    pub unsafe fn as_procedure(&self) -> fn() {
        unsafe { std::mem::transmute::<*const (), fn()>(self.address() as *const ()) }
    }

    /// View the symbol as a [`ValueFn`].
    ///
    /// # Safety
    /// Same contract as [`Symbol::as_procedure`], for the [`ValueFn`] signature.
    pub unsafe fn as_value(&self) -> ValueFn {
        unsafe { std::mem::transmute::<*const (), ValueFn>(self.address() as *const ()) }
    }

    /// View the symbol as a [`FallibleFn`].
    ///
    /// # Safety
    /// Same contract as [`Symbol::as_procedure`], for the [`FallibleFn`] signature.
    pub unsafe fn as_fallible(&self) -> FallibleFn {
        unsafe { std::mem::transmute::<*const (), FallibleFn>(self.address() as *const ()) }
    }
}

/// The signature a caller claims a symbol has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Procedure,
    Value,
    Fallible,
    Init,
    Load,
    Backend,
    Close,
}

/// A symbol reinterpreted according to a [`Shape`].
#[derive(Clone, Copy)]
pub enum Callable {
    Procedure(fn()),
    Value(ValueFn),
    Fallible(FallibleFn),
    Init(InitFn),
    Load(LoadFn),
    Backend(BackendFn),
    Close(CloseFn),
}

impl Callable {
    pub fn shape(&self) -> Shape {
        match self {
            Callable::Procedure(_) => Shape::Procedure,
            Callable::Value(_) => Shape::Value,
            Callable::Fallible(_) => Shape::Fallible,
            Callable::Init(_) => Shape::Init,
            Callable::Load(_) => Shape::Load,
            Callable::Backend(_) => Shape::Backend,
            Callable::Close(_) => Shape::Close,
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callable").field(&self.shape()).finish()
    }
}

enum SymbolSource {
    Library(Library),
    /// In-process table of name to address, used for statically linked
    /// plugins.
    Static(HashMap<String, usize>),
}

/// The symbols of one loaded artifact.
///
/// Owns the underlying library: dropping the table unloads it, which
/// invalidates every [`Symbol`] taken from it.
pub struct SymbolTable {
    origin: PathBuf,
    source: SymbolSource,
}

impl SymbolTable {
    pub fn from_library(origin: impl Into<PathBuf>, library: Library) -> Self {
        Self {
            origin: origin.into(),
            source: SymbolSource::Library(library),
        }
    }

    /// A table over addresses of functions linked into this process.
    pub fn from_static<I, S>(origin: impl Into<PathBuf>, entries: I) -> Self
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        Self {
            origin: origin.into(),
            source: SymbolSource::Static(entries.into_iter().map(|(name, addr)| (name.into(), addr)).collect()),
        }
    }

    /// Path the table was loaded from.
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    /// Look up a symbol by exact name.
    pub fn lookup(&self, name: &str) -> Result<Symbol> {
        let address = match &self.source {
            // SAFETY: the symbol is read as an opaque address and never
            // dereferenced here.
            SymbolSource::Library(library) => unsafe {
                library
                    .get::<*mut c_void>(name.as_bytes())
                    .map(|symbol| *symbol as usize)
                    .unwrap_or(0)
            },
            SymbolSource::Static(entries) => entries.get(name).copied().unwrap_or(0),
        };

        Symbol::from_address(address).ok_or_else(|| Error::SymbolNotFound {
            symbol: name.to_string(),
        })
    }

    /// Look up a symbol and reinterpret it as `shape`.
    ///
    /// # Safety
    /// The symbol must have the signature `shape` names.
    pub unsafe fn callable(&self, name: &str, shape: Shape) -> Result<Callable> {
        let symbol = self.lookup(name)?;
        let address = symbol.address() as *const ();
        let callable = unsafe {
            match shape {
                Shape::Procedure => Callable::Procedure(symbol.as_procedure()),
                Shape::Value => Callable::Value(symbol.as_value()),
                Shape::Fallible => Callable::Fallible(symbol.as_fallible()),
                Shape::Init => Callable::Init(std::mem::transmute::<*const (), InitFn>(address)),
                Shape::Load => Callable::Load(std::mem::transmute::<*const (), LoadFn>(address)),
                Shape::Backend => Callable::Backend(std::mem::transmute::<*const (), BackendFn>(address)),
                Shape::Close => Callable::Close(std::mem::transmute::<*const (), CloseFn>(address)),
            }
        };
        Ok(callable)
    }
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.source {
            SymbolSource::Library(_) => "library",
            SymbolSource::Static(_) => "static",
        };
        f.debug_struct("SymbolTable")
            .field("origin", &self.origin)
            .field("kind", &kind)
            .finish()
    }
}

/// Typed lifecycle entry points of a plugin. Missing symbols are `None`.
#[derive(Clone, Copy, Default)]
pub struct EntryPoints {
    pub init: Option<InitFn>,
    pub load: Option<LoadFn>,
    pub backend: Option<BackendFn>,
    pub close: Option<CloseFn>,
}

impl fmt::Debug for EntryPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoints")
            .field("init", &self.init.is_some())
            .field("load", &self.load.is_some())
            .field("backend", &self.backend.is_some())
            .field("close", &self.close.is_some())
            .finish()
    }
}

impl EntryPoints {
    /// Resolve the lifecycle symbols of `table`.
    ///
    /// # Safety
    /// Every lifecycle symbol present in the table must have the signature
    /// declared by `kiln_plugin` (as emitted by `export_plugin!`).
    pub unsafe fn resolve(table: &SymbolTable) -> Self {
        let mut entry = EntryPoints::default();
        unsafe {
            if let Ok(Callable::Init(f)) = table.callable(symbols::INIT, Shape::Init) {
                entry.init = Some(f);
            }
            if let Ok(Callable::Load(f)) = table.callable(symbols::LOAD, Shape::Load) {
                entry.load = Some(f);
            }
            if let Ok(Callable::Backend(f)) = table.callable(symbols::BACKEND, Shape::Backend) {
                entry.backend = Some(f);
            }
            if let Ok(Callable::Close(f)) = table.callable(symbols::CLOSE, Shape::Close) {
                entry.close = Some(f);
            }
        }
        entry
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic reason".to_string()
    }
}

/// Run a plugin callback, turning a panic into [`Error::Panicked`].
fn guarded<T>(operation: &'static str, f: impl FnOnce() -> T) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| Error::Panicked {
        operation,
        message: panic_message(payload.as_ref()),
    })
}

fn callback(operation: &'static str, f: impl FnOnce() -> PluginResult) -> Result<()> {
    guarded(operation, f)?.map_err(|source| Error::Callback { operation, source })
}

/// A plugin artifact loaded into the process.
pub struct LoadedPlugin {
    alias: String,
    artifact: PathBuf,
    entry: EntryPoints,
    backend: OnceLock<Option<Backend>>,
    // Declared last so the library outlives the entry points above.
    symbols: SymbolTable,
}

impl LoadedPlugin {
    /// Wrap a symbol table, resolving the lifecycle entry points.
    ///
    /// Artifacts are trusted to follow the plugin contract: lifecycle symbols
    /// are emitted by `export_plugin!` with the signatures of `kiln_plugin`.
    pub fn new(alias: impl Into<String>, symbols: SymbolTable) -> Self {
        // SAFETY: see the contract above.
        let entry = unsafe { EntryPoints::resolve(&symbols) };
        Self {
            alias: alias.into(),
            artifact: symbols.origin().to_path_buf(),
            entry,
            backend: OnceLock::new(),
            symbols,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    pub fn entry_points(&self) -> &EntryPoints {
        &self.entry
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn lookup(&self, name: &str) -> Result<Symbol> {
        self.symbols.lookup(name)
    }

    /// Call `Init`. A plugin without one needs no setup.
    pub fn init(&self, env: &PluginEnv) -> Result<()> {
        match self.entry.init {
            Some(init) => callback("Init", || init(env)),
            None => Ok(()),
        }
    }

    /// Call `Load` with a view of the host.
    pub fn link(&self, host: &dyn Host) -> Result<()> {
        match self.entry.load {
            Some(load) => callback("Load", || load(host)),
            None => Ok(()),
        }
    }

    /// The plugin's backend, resolved on first access.
    pub fn backend(&self) -> Result<Option<Backend>> {
        if let Some(backend) = self.backend.get() {
            return Ok(backend.clone());
        }
        let backend = match self.entry.backend {
            Some(backend_fn) => guarded("Backend", backend_fn)?,
            None => None,
        };
        Ok(self.backend.get_or_init(|| backend).clone())
    }

    /// Call `Close`. A missing symbol is not an error.
    pub fn close(&self) -> Result<()> {
        match self.entry.close {
            Some(close) => callback("Close", close),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("alias", &self.alias)
            .field("artifact", &self.artifact)
            .finish()
    }
}

/// Loads artifacts into symbol tables.
pub trait DynamicLoader: Send + Sync {
    /// Open `artifact`, falling back to its file name inside each of
    /// `search_paths`.
    fn load(&self, artifact: &Path, search_paths: &[PathBuf]) -> Result<SymbolTable>;
}

/// [`DynamicLoader`] backed by the platform loader through `libloading`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibraryLoader;

impl LibraryLoader {
    /// First existing candidate for `artifact`, or `artifact` itself.
    pub fn resolve(artifact: &Path, search_paths: &[PathBuf]) -> PathBuf {
        if artifact.exists() {
            return artifact.to_path_buf();
        }
        artifact
            .file_name()
            .and_then(|name| {
                search_paths
                    .iter()
                    .map(|dir| dir.join(name))
                    .find(|candidate| candidate.exists())
            })
            .unwrap_or_else(|| artifact.to_path_buf())
    }
}

impl DynamicLoader for LibraryLoader {
    fn load(&self, artifact: &Path, search_paths: &[PathBuf]) -> Result<SymbolTable> {
        let path = Self::resolve(artifact, search_paths);
        debug!("Loading library {}", path.display());

        // SAFETY: loading runs the library's initializers. Artifacts are
        // built from trusted plugin sources by the same toolchain.
        let library = unsafe { Library::new(&path) }.map_err(|e| Error::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Ok(SymbolTable::from_library(path, library))
    }
}
