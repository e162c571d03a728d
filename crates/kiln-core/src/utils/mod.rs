//! Small filesystem helpers shared by the plugin system.
pub mod fs;

use std::path::Path;

pub use fs::{copy_artifact, create_dir_all, path_exists};

/// Check if a path is an existing file
pub fn is_file<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().is_file()
}

/// File name component of a path, if any
pub fn file_name<P: AsRef<Path>>(path: P) -> Option<String> {
    path.as_ref()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Text of the file name before its first `.`
///
/// Unlike [`Path::file_stem`] this strips every extension, so
/// `libfoo.so.1` gives `libfoo`.
pub fn short_stem<P: AsRef<Path>>(path: P) -> Option<String> {
    let name = file_name(path)?;
    let stem = name.split('.').next().unwrap_or_default();
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

#[cfg(test)]
mod tests;
