//! Binding a plugin backend to a typed destination.
use std::any::type_name;
use std::sync::Arc;

use kiln_plugin::Backend;

use crate::error::{Error, Result};

/// Store the backend in `destination` as an `Arc<C>`.
///
/// Succeeds when `C` is exactly the backend's concrete type or a capability
/// (usually a `dyn Trait`) the backend declared. On mismatch `destination`
/// is left untouched and the error names both types.
pub fn bind_backend<C>(backend: &Backend, destination: &mut Option<Arc<C>>) -> Result<()>
where
    C: ?Sized + Send + Sync + 'static,
{
    match backend.get::<C>() {
        Some(handle) => {
            *destination = Some(handle);
            Ok(())
        }
        None => Err(Error::TypeMismatch {
            expected: type_name::<C>(),
            actual: backend.type_name(),
        }),
    }
}
