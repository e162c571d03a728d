use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A capability handle: an `Arc<C>` erased behind `Any`.
#[derive(Clone)]
struct Capability {
    name: &'static str,
    handle: Arc<dyn Any + Send + Sync>,
}

/// The value a plugin exposes to its host.
///
/// A backend wraps one concrete value and the set of capabilities (usually
/// trait objects) that value satisfies. The concrete type is always
/// registered as a capability of itself, so callers can ask either for the
/// exact type or for any declared `dyn Trait`:
///
/// ```
/// use std::sync::Arc;
/// use kiln_plugin::Backend;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// struct English;
/// impl Greeter for English {
///     fn greet(&self) -> String { "hello".into() }
/// }
///
/// let english = Arc::new(English);
/// let backend = Backend::from_arc(english.clone()).with_capability::<dyn Greeter>(english);
///
/// assert!(backend.is::<English>());
/// assert_eq!(backend.get::<dyn Greeter>().unwrap().greet(), "hello");
/// ```
#[derive(Clone)]
pub struct Backend {
    type_id: TypeId,
    type_name: &'static str,
    capabilities: HashMap<TypeId, Capability>,
}

impl Backend {
    /// Wrap a concrete value.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wrap an already shared concrete value.
    pub fn from_arc<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        let backend = Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            capabilities: HashMap::new(),
        };
        backend.with_capability::<T>(value)
    }

    /// Declare a capability the backend value satisfies.
    ///
    /// `C` is normally a trait object type and `handle` the backend value
    /// coerced to it.
    pub fn with_capability<C: ?Sized + Send + Sync + 'static>(mut self, handle: Arc<C>) -> Self {
        self.capabilities.insert(
            TypeId::of::<C>(),
            Capability {
                name: type_name::<C>(),
                handle: Arc::new(handle),
            },
        );
        self
    }

    /// Name of the concrete type behind this backend.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// True if the concrete type is exactly `T`.
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// True if `C` is the concrete type or a declared capability.
    pub fn provides<C: ?Sized + 'static>(&self) -> bool {
        self.capabilities.contains_key(&TypeId::of::<C>())
    }

    /// The value viewed as `C`, if the backend provides it.
    pub fn get<C: ?Sized + 'static>(&self) -> Option<Arc<C>> {
        self.capabilities
            .get(&TypeId::of::<C>())
            .and_then(|capability| capability.handle.downcast_ref::<Arc<C>>())
            .cloned()
    }

    /// Names of every capability, the concrete type included.
    pub fn capability_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.capabilities.values().map(|c| c.name).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("type_name", &self.type_name)
            .field("capabilities", &self.capability_names())
            .finish()
    }
}
