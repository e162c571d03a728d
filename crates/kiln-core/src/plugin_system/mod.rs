//! # Kiln Plugin System
//!
//! Drives a plugin from a textual key to a loaded, callable module.
//!
//! ## Key Submodules and Responsibilities:
//!
//! - **[`identifier`]**: Pure parsing of plugin keys (`source as alias`) and
//!   handler keys (`alias.Method(args)`).
//! - **[`source`]**: Classifies a source as a local artifact, a local source
//!   tree or a repository reference, and derives the on-disk [`Layout`].
//! - **[`git`]** and **[`acquire`]**: The source-control collaborator and the
//!   engine bringing each repository to its branch or version.
//! - **[`toolchain`]** and **[`runner`]**: The build/test collaborator and the
//!   per-plugin build and test steps.
//! - **[`loader`]**: Opens artifacts into symbol tables and exposes typed
//!   entry points.
//! - **[`backend`]**: Binds a plugin backend to a typed destination.
//! - **[`record`]**: The per-plugin aggregate and its lifecycle state.
//! - **[`queue`]**: The bounded worker pool used by concurrent batches.
//! - **[`registry`]**: The [`PluginRegistry`] orchestrating all of the above.
pub mod acquire;
pub mod backend;
pub mod git;
pub mod identifier;
pub mod loader;
pub mod queue;
pub mod record;
pub mod registry;
pub mod runner;
pub mod source;
pub mod toolchain;

pub use backend::bind_backend;
pub use identifier::{parse_handler_key, parse_key, HandlerCall};
pub use loader::{Callable, DynamicLoader, EntryPoints, LibraryLoader, LoadedPlugin, Shape, Symbol, SymbolTable};
pub use queue::TaskQueue;
pub use record::{PluginRecord, PluginState, RecordInfo};
pub use registry::{PluginRegistry, RegistryBuilder};
pub use source::{classify_source, DedupeStrategy, Layout, RepoRef, Source, SourceKind};

// Test module declaration
#[cfg(test)]
mod tests;
