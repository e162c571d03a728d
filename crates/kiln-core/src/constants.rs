/// Application name
pub const APP_NAME: &str = "kiln";

/// Default configuration file looked up by the binary
pub const DEFAULT_CONFIG_FILE: &str = "kiln.toml";

/// Default registry root directory (one artifact per plugin)
pub const DEFAULT_ROOT_DIR: &str = "plugins";

/// Directory under the root that caches repository clones
pub const SOURCES_DIR_NAME: &str = "sources";

/// Default number of workers for the async batch operations
pub const DEFAULT_WORKERS: usize = 4;

/// Delimiter between a plugin source and its explicit alias
pub const ALIAS_DELIMITER: &str = " as ";

/// Prefixes marking a key as a local path
pub const LOCAL_MARKERS: [&str; 3] = ["./", "../", "/"];

/// Shared library extensions recognized as prebuilt artifacts
pub const ARTIFACT_EXTENSIONS: [&str; 3] = ["so", "dylib", "dll"];

/// Extension of artifacts built by this host
pub const ARTIFACT_EXTENSION: &str = std::env::consts::DLL_EXTENSION;

/// Scheme used to clone repository references
pub const DEFAULT_GIT_SCHEME: &str = "https";

/// Substring of `cargo test` output reported by a passing suite
pub const TEST_PASS_MARKER: &str = "test result: ok";
