use std::collections::HashMap;

use crate::backend::Backend;

/// Configuration values handed to every plugin's `Init`.
pub type PluginEnv = HashMap<String, String>;

/// Error type returned across the plugin boundary.
pub type PluginError = Box<dyn std::error::Error + Send + Sync>;

/// Shorthand for results returned by plugin callbacks.
pub type PluginResult<T = ()> = Result<T, PluginError>;

/// Signature of the exported `Init` symbol.
pub type InitFn = fn(&PluginEnv) -> PluginResult;
/// Signature of the exported `Load` symbol.
pub type LoadFn = fn(&dyn Host) -> PluginResult;
/// Signature of the exported `Backend` symbol.
pub type BackendFn = fn() -> Option<Backend>;
/// Signature of the exported `Close` symbol.
pub type CloseFn = fn() -> PluginResult;

/// Read access to the orchestrating registry, handed to `Load`.
///
/// Plugins use it to find the sibling plugins they depend on.
pub trait Host {
    /// Aliases of every plugin loaded into the host, in registration order.
    fn aliases(&self) -> Vec<String>;

    /// Backend of a loaded sibling, if it exposes one.
    fn backend(&self, alias: &str) -> Option<Backend>;
}

/// Core trait that all plugins implement.
///
/// Every method has a no-op default, so a plugin only overrides the
/// lifecycle steps it cares about. Calls happen in declaration order:
/// `init` once, `load` once, `backend` any number of times, `close` once.
pub trait Plugin: Send + Sync + 'static {
    /// One-time setup using caller supplied configuration values.
    fn init(&self, _env: &PluginEnv) -> PluginResult {
        Ok(())
    }

    /// Resolve sibling plugins through the host.
    fn load(&self, _host: &dyn Host) -> PluginResult {
        Ok(())
    }

    /// The value representing this plugin's API surface. May be `None`.
    fn backend(&self) -> Option<Backend> {
        None
    }

    /// Release resources.
    fn close(&self) -> PluginResult {
        Ok(())
    }
}
