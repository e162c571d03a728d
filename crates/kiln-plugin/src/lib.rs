//! # Kiln Plugin API
//!
//! The plugin-facing half of kiln. A plugin is a `cdylib` crate that links this
//! crate, implements [`Plugin`] and calls [`export_plugin!`] once. The macro
//! emits the four symbols the host looks up by name after loading the
//! artifact:
//!
//! | Symbol    | Signature                                   |
//! |-----------|---------------------------------------------|
//! | `Init`    | [`InitFn`]: `fn(&PluginEnv) -> PluginResult` |
//! | `Load`    | [`LoadFn`]: `fn(&dyn Host) -> PluginResult`  |
//! | `Backend` | [`BackendFn`]: `fn() -> Option<Backend>`     |
//! | `Close`   | [`CloseFn`]: `fn() -> PluginResult`          |
//!
//! The symbols use the Rust ABI. Plugins must therefore be compiled with the
//! same toolchain (and the same version of this crate) as the host.
//!
//! ```rust,ignore
//! use kiln_plugin::{export_plugin, Backend, Plugin, PluginEnv, PluginResult};
//!
//! #[derive(Default)]
//! struct Greeter;
//!
//! impl Plugin for Greeter {
//!     fn backend(&self) -> Option<Backend> {
//!         Some(Backend::new(String::from("hello")))
//!     }
//! }
//!
//! export_plugin!(Greeter, Greeter::default());
//! ```
pub mod backend;
pub mod traits;

mod macros;

pub use backend::Backend;
pub use traits::{
    BackendFn, CloseFn, Host, InitFn, LoadFn, Plugin, PluginEnv, PluginError, PluginResult,
};

/// Names of the lifecycle symbols every plugin exports.
pub mod symbols {
    /// One-time setup with caller supplied configuration values.
    pub const INIT: &str = "Init";
    /// Called with a handle to the host once every plugin has been initialized.
    pub const LOAD: &str = "Load";
    /// Returns the plugin's exposed API surface.
    pub const BACKEND: &str = "Backend";
    /// Releases resources; invoked exactly once at shutdown.
    pub const CLOSE: &str = "Close";

    /// All lifecycle symbols in invocation order.
    pub const LIFECYCLE: [&str; 4] = [INIT, LOAD, BACKEND, CLOSE];
}
