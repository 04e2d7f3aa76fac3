//! System heap wrapper for object blocks.

use std::alloc::{alloc, dealloc};
use std::any::Any;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::allocators::block::{self, HeaderPtr, ObjectBlock};
use crate::api::tag::ObjectType;

/// Allocates and frees header+payload blocks through the system allocator.
pub struct ObjectHeap {
    /// Total bytes currently allocated
    allocated_bytes: AtomicUsize,

    /// Total allocation count
    allocation_count: AtomicUsize,

    /// Fill freed blocks with the poison pattern instead of zeroes
    #[cfg_attr(not(feature = "debug"), allow(dead_code))]
    poison: bool,
}

impl ObjectHeap {
    /// Create a new heap wrapper.
    pub fn new(poison: bool) -> Self {
        Self {
            allocated_bytes: AtomicUsize::new(0),
            allocation_count: AtomicUsize::new(0),
            poison,
        }
    }

    /// Allocate a block holding `value`, refcount 1, not yet live.
    ///
    /// Returns `None` when the system allocator fails; `value` is dropped.
    pub(crate) fn alloc_block<T: Any + Send + Sync>(
        &self,
        object_type: ObjectType,
        identifier: String,
        value: T,
    ) -> Option<HeaderPtr> {
        let layout = block::block_layout::<T>();

        // SAFETY: block layouts always have a non-zero size (the header)
        let raw = NonNull::new(unsafe { alloc(layout) } as *mut ObjectBlock<T>)?;

        // SAFETY: freshly allocated with the block layout
        let ptr = unsafe { block::init_block(raw, object_type, identifier, value) };

        self.allocated_bytes.fetch_add(layout.size(), Ordering::Relaxed);
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
        Some(ptr)
    }

    /// Drop a block's contents, wipe it and return it to the system.
    ///
    /// # Safety
    ///
    /// The block must have come from `alloc_block`, be unlinked from every
    /// bucket, and the caller must own its destruction.
    pub(crate) unsafe fn free_block(&self, ptr: HeaderPtr) {
        let layout = block::drop_block(ptr);
        let raw = ptr.as_ptr() as *mut u8;

        #[cfg(feature = "debug")]
        {
            if self.poison {
                crate::debug::poison::poison_freed(raw, layout.size());
            } else {
                std::ptr::write_bytes(raw, 0, layout.size());
            }
        }
        #[cfg(not(feature = "debug"))]
        std::ptr::write_bytes(raw, 0, layout.size());

        dealloc(raw, layout);

        self.allocated_bytes.fetch_sub(layout.size(), Ordering::Relaxed);
    }

    /// Get total bytes currently allocated.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes.load(Ordering::Relaxed)
    }

    /// Get total allocation count.
    pub fn allocation_count(&self) -> usize {
        self.allocation_count.load(Ordering::Relaxed)
    }
}

impl Default for ObjectHeap {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocators::block::Liveness;
    use std::sync::Arc;

    struct Payload {
        value: u64,
        _drops: Arc<()>,
    }

    #[test]
    fn test_block_allocation() {
        let heap = ObjectHeap::new(false);
        let drops = Arc::new(());

        let ptr = heap
            .alloc_block(
                ObjectType::Line,
                "line-100".to_string(),
                Payload { value: 7, _drops: drops.clone() },
            )
            .unwrap();

        let header = unsafe { ptr.header() };
        assert_eq!(header.refcount(), 1);
        assert_eq!(header.liveness(), Liveness::Constructing);
        assert_eq!(header.object_type(), ObjectType::Line);
        assert_eq!(header.identifier(), "line-100");
        assert_eq!(header.payload_size(), std::mem::size_of::<Payload>());
        assert_ne!(header.payload_address(), ptr.address());

        let payload = unsafe { &*(header.payload_address() as *const Payload) };
        assert_eq!(payload.value, 7);

        assert!(heap.allocated_bytes() > 0);
        assert_eq!(Arc::strong_count(&drops), 2);

        unsafe { heap.free_block(ptr) };
        assert_eq!(heap.allocated_bytes(), 0);
        assert_eq!(heap.allocation_count(), 1);
        assert_eq!(Arc::strong_count(&drops), 1, "payload must be dropped");
    }

    #[test]
    fn test_refcount_never_leaves_zero() {
        let heap = ObjectHeap::default();
        let ptr = heap.alloc_block(ObjectType::Generic, String::new(), 0u8).unwrap();
        let header = unsafe { ptr.header() };

        assert_eq!(header.try_retain(), Some(2));
        assert_eq!(header.try_release(), Some(1));
        assert_eq!(header.try_release(), Some(0));
        assert_eq!(header.try_release(), None);
        assert_eq!(header.try_retain(), None);

        unsafe { heap.free_block(ptr) };
    }

    #[test]
    fn test_dead_flip_is_one_shot() {
        let heap = ObjectHeap::default();
        let ptr = heap.alloc_block(ObjectType::Generic, String::new(), ()).unwrap();
        let header = unsafe { ptr.header() };

        assert!(!header.mark_dead(), "cannot kill an unpublished object");
        header.mark_live();
        assert!(header.is_live());
        assert!(header.mark_dead());
        assert!(!header.mark_dead());
        assert_eq!(header.liveness(), Liveness::Dead);

        unsafe { heap.free_block(ptr) };
    }
}
