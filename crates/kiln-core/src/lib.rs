//! # Kiln Core
//!
//! Plugin acquisition, build and dynamic loading. See [`plugin_system`] for
//! the lifecycle and [`PluginRegistry`] for the entry point.
pub mod config;
pub mod constants;
pub mod error;
pub mod plugin_system;
pub mod utils;

pub use config::KilnConfig;
pub use error::{Error, Phase, Result};
pub use plugin_system::{PluginRegistry, TaskQueue};

// Re-export the plugin API so hosts only need one dependency.
pub use kiln_plugin;
