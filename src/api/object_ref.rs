//! Typed references to managed objects.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ptr::NonNull;

/// A counted reference to a managed payload of type `T`.
///
/// `ObjectRef` is only the payload address plus a type; it does not own a
/// count by itself. Whoever holds one is responsible for pairing it with a
/// [`release`](crate::ObjectRegistry::release). The registry validates the
/// address on every retain and release, so a stale reference yields
/// [`RegistryError::InvalidReference`](crate::RegistryError) instead of a
/// use-after-free.
pub struct ObjectRef<T> {
    ptr: NonNull<T>,
    _marker: PhantomData<*const T>,
}

impl<T> ObjectRef<T> {
    pub(crate) fn new(ptr: NonNull<T>) -> Self {
        Self {
            ptr,
            _marker: PhantomData,
        }
    }

    /// Rebuild a reference from a raw payload pointer.
    ///
    /// Nothing is checked here; the next retain or release validates it.
    pub fn from_ptr(ptr: NonNull<T>) -> Self {
        Self::new(ptr)
    }

    /// Payload address; the key the registry hashes.
    pub fn address(self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Raw payload pointer.
    pub fn as_ptr(self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Borrow the payload.
    ///
    /// # Safety
    ///
    /// The caller must hold a count on the object for all of `'a`, and the
    /// object must have been allocated with payload type `T`. Concurrent
    /// access to interior fields needs the payload's own synchronisation.
    pub unsafe fn as_ref<'a>(self) -> &'a T {
        &*self.ptr.as_ptr()
    }
}

impl<T> Clone for ObjectRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ObjectRef<T> {}

impl<T> PartialEq for ObjectRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T> Eq for ObjectRef<T> {}

impl<T> Hash for ObjectRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr.hash(state);
    }
}

impl<T> fmt::Debug for ObjectRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:#x})", self.address())
    }
}

impl<T> fmt::Pointer for ObjectRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.ptr, f)
    }
}

// SAFETY: an ObjectRef is an address. Payloads are required to be
// Send + Sync at allocation, and dereferencing is unsafe.
unsafe impl<T: Send + Sync> Send for ObjectRef<T> {}
unsafe impl<T: Send + Sync> Sync for ObjectRef<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_and_eq() {
        let mut value = 5u32;
        let a = ObjectRef::from_ptr(NonNull::from(&mut value));
        let b = a;
        assert_eq!(a, b);
        assert_eq!(a.address(), &value as *const u32 as usize);
        assert_eq!(format!("{:?}", a), format!("ObjectRef({:#x})", a.address()));
    }
}
