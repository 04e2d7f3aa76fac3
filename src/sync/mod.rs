//! Synchronization primitives.
//!
//! Provides thin wrappers over std or parking_lot locks.

pub(crate) mod atomics;
pub(crate) mod mutex;
pub(crate) mod rwlock;
