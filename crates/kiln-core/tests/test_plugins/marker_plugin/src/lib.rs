//! Test plugin that leaves marker files behind so the host can observe each
//! lifecycle call.
use std::path::PathBuf;
use std::sync::Mutex;

use kiln_plugin::{export_plugin, Backend, Host, Plugin, PluginEnv, PluginResult};

#[derive(Default)]
struct MarkerPlugin {
    dir: Mutex<Option<PathBuf>>,
}

impl MarkerPlugin {
    fn mark(&self, name: &str, contents: &str) -> PluginResult {
        let dir = self.dir.lock().map_err(|e| e.to_string())?.clone();
        match dir {
            Some(dir) => Ok(std::fs::write(dir.join(name), contents)?),
            None => Err("marker_dir was never configured".into()),
        }
    }
}

impl Plugin for MarkerPlugin {
    fn init(&self, env: &PluginEnv) -> PluginResult {
        let dir = env.get("marker_dir").ok_or("missing marker_dir")?;
        *self.dir.lock().map_err(|e| e.to_string())? = Some(PathBuf::from(dir));
        self.mark("init", "ok")
    }

    fn load(&self, host: &dyn Host) -> PluginResult {
        self.mark("load", &host.aliases().join(","))
    }

    fn backend(&self) -> Option<Backend> {
        Some(Backend::new(String::from("marker")))
    }

    fn close(&self) -> PluginResult {
        self.mark("close", "ok")
    }
}

export_plugin!(MarkerPlugin, MarkerPlugin::default());
