use std::path::Path;

use crate::error::{Error, Result};

/// Whether a path exists. Errors while checking count as "does not exist".
pub async fn path_exists<P: AsRef<Path>>(path: P) -> bool {
    tokio::fs::try_exists(path.as_ref()).await.unwrap_or(false)
}

/// Create a directory and all its parents
pub async fn create_dir_all<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| Error::io(e, "create directory", path))
}

/// Copy a built library to its artifact path, creating the parent directory.
pub async fn copy_artifact<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> Result<()> {
    let (from, to) = (from.as_ref(), to.as_ref());
    if let Some(parent) = to.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent).await?;
        }
    }
    tokio::fs::copy(from, to)
        .await
        .map(|_| ())
        .map_err(|e| Error::io(e, format!("copy artifact from '{}'", from.display()), to))
}
