//! Read/write lock wrapper - uses parking_lot if available, std otherwise.
//!
//! Bucket lists are scanned far more often than they are spliced, so every
//! bucket carries one of these.

#[cfg(feature = "parking_lot")]
pub use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[cfg(not(feature = "parking_lot"))]
mod std_rwlock {
    use std::sync::{
        PoisonError, RwLock as StdRwLock, RwLockReadGuard as StdReadGuard,
        RwLockWriteGuard as StdWriteGuard,
    };

    /// Thin wrapper around std::sync::RwLock.
    #[derive(Debug, Default)]
    pub struct RwLock<T>(StdRwLock<T>);

    impl<T> RwLock<T> {
        /// Create a new lock.
        pub const fn new(value: T) -> Self {
            Self(StdRwLock::new(value))
        }

        /// Acquire shared access.
        pub fn read(&self) -> RwLockReadGuard<'_, T> {
            RwLockReadGuard(self.0.read().unwrap_or_else(PoisonError::into_inner))
        }

        /// Acquire exclusive access.
        pub fn write(&self) -> RwLockWriteGuard<'_, T> {
            RwLockWriteGuard(self.0.write().unwrap_or_else(PoisonError::into_inner))
        }
    }

    /// Shared guard for std lock.
    pub struct RwLockReadGuard<'a, T>(StdReadGuard<'a, T>);

    impl<'a, T> std::ops::Deref for RwLockReadGuard<'a, T> {
        type Target = T;

        fn deref(&self) -> &Self::Target {
            &self.0
        }
    }

    /// Exclusive guard for std lock.
    pub struct RwLockWriteGuard<'a, T>(StdWriteGuard<'a, T>);

    impl<'a, T> std::ops::Deref for RwLockWriteGuard<'a, T> {
        type Target = T;

        fn deref(&self) -> &Self::Target {
            &self.0
        }
    }

    impl<'a, T> std::ops::DerefMut for RwLockWriteGuard<'a, T> {
        fn deref_mut(&mut self) -> &mut Self::Target {
            &mut self.0
        }
    }
}

#[cfg(not(feature = "parking_lot"))]
pub use std_rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_then_write() {
        let lock = RwLock::new(vec![1u32]);
        {
            let a = lock.read();
            let b = lock.read();
            assert_eq!(a.len(), b.len());
        }
        lock.write().push(2);
        assert_eq!(*lock.read(), vec![1, 2]);
    }
}
