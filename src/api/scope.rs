//! Scope guards that release a reference when dropped.

use crate::api::object_ref::ObjectRef;
use crate::api::registry::ObjectRegistry;
use crate::diagnostics::CallSite;

/// A retained reference that is released at the end of its scope.
///
/// Returned by [`ObjectRegistry::retain_scoped`]. Call
/// [`into_inner`](AutoRelease::into_inner) to keep the reference instead.
///
/// # Example
///
/// ```rust
/// use refcount_registry::{ObjectRegistry, ObjectType, RegistryConfig};
///
/// let registry = ObjectRegistry::new(RegistryConfig::minimal());
/// registry.init().unwrap();
/// let line = registry.allocate(ObjectType::Line, "100", 7u32, None).unwrap();
///
/// {
///     let guard = registry.retain_scoped(line).unwrap();
///     assert_eq!(unsafe { *guard.object().as_ref() }, 7);
/// } // released here
///
/// registry.release(line).unwrap();
/// ```
#[must_use = "the reference is released as soon as the guard is dropped"]
pub struct AutoRelease<'a, T> {
    registry: &'a ObjectRegistry,
    object: ObjectRef<T>,
    armed: bool,
    site: CallSite,
}

impl<'a, T: 'static> AutoRelease<'a, T> {
    pub(crate) fn new(registry: &'a ObjectRegistry, object: ObjectRef<T>, site: CallSite) -> Self {
        Self {
            registry,
            object,
            armed: true,
            site,
        }
    }

    /// The guarded reference.
    pub fn object(&self) -> ObjectRef<T> {
        self.object
    }

    /// Keep the count: the caller now owns the release.
    pub fn into_inner(mut self) -> ObjectRef<T> {
        self.armed = false;
        self.object
    }
}

impl<T> Drop for AutoRelease<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            // Failures were already reported through diagnostics
            let _ = self.registry.release_at(self.object.address(), self.site);
        }
    }
}
