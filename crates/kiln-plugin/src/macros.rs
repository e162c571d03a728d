/// Export a [`Plugin`](crate::Plugin) implementation under the lifecycle
/// symbol names the host looks up.
///
/// The first argument is the plugin type, the second an expression building
/// the instance. The instance is created lazily on first use and lives for
/// the rest of the process.
#[macro_export]
macro_rules! export_plugin {
    ($plugin_type:ty, $constructor:expr) => {
        static __KILN_PLUGIN_INSTANCE: ::std::sync::OnceLock<$plugin_type> =
            ::std::sync::OnceLock::new();

        fn __kiln_plugin_instance() -> &'static $plugin_type {
            __KILN_PLUGIN_INSTANCE.get_or_init(|| $constructor)
        }

        #[unsafe(no_mangle)]
        #[allow(non_snake_case)]
        pub fn Init(env: &$crate::PluginEnv) -> $crate::PluginResult {
            $crate::Plugin::init(__kiln_plugin_instance(), env)
        }

        #[unsafe(no_mangle)]
        #[allow(non_snake_case)]
        pub fn Load(host: &dyn $crate::Host) -> $crate::PluginResult {
            $crate::Plugin::load(__kiln_plugin_instance(), host)
        }

        #[unsafe(no_mangle)]
        #[allow(non_snake_case)]
        pub fn Backend() -> ::std::option::Option<$crate::Backend> {
            $crate::Plugin::backend(__kiln_plugin_instance())
        }

        #[unsafe(no_mangle)]
        #[allow(non_snake_case)]
        pub fn Close() -> $crate::PluginResult {
            $crate::Plugin::close(__kiln_plugin_instance())
        }

        // Compile-time check that the exported functions match the host's view.
        const _: () = {
            let _: $crate::InitFn = Init;
            let _: $crate::LoadFn = Load;
            let _: $crate::BackendFn = Backend;
            let _: $crate::CloseFn = Close;
        };
    };
}
