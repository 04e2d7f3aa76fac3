//! Object blocks: a header immediately followed by the caller's payload.
//!
//! The payload address is what callers hold and what the directory hashes;
//! the header address is only shown in listings.

use std::alloc::Layout;
use std::any::Any;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use crate::api::tag::ObjectType;
use crate::sync::mutex::Mutex;

/// Tri-state alive marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Liveness {
    /// Allocated, not yet published in a bucket.
    Constructing = 0,
    /// Published and reachable.
    Live = 1,
    /// Claimed for destruction; never reachable again.
    Dead = 2,
}

impl From<u8> for Liveness {
    fn from(val: u8) -> Self {
        match val {
            0 => Liveness::Constructing,
            1 => Liveness::Live,
            _ => Liveness::Dead,
        }
    }
}

/// Type-erased operations on the payload of a block.
#[derive(Clone, Copy)]
pub(crate) struct BlockOps {
    drop_payload: unsafe fn(NonNull<u8>),
    payload_any: unsafe fn(NonNull<u8>) -> *mut dyn Any,
}

impl BlockOps {
    fn of<T: Any>() -> Self {
        Self {
            drop_payload: drop_payload::<T>,
            payload_any: payload_any::<T>,
        }
    }
}

unsafe fn drop_payload<T>(payload: NonNull<u8>) {
    std::ptr::drop_in_place(payload.cast::<T>().as_ptr());
}

unsafe fn payload_any<T: Any>(payload: NonNull<u8>) -> *mut dyn Any {
    payload.cast::<T>().as_ptr() as *mut dyn Any
}

/// Metadata prefixed to every managed payload.
pub(crate) struct ObjectHeader {
    refcount: AtomicUsize,
    alive: AtomicU8,
    object_type: ObjectType,
    identifier: Mutex<String>,
    payload: NonNull<u8>,
    payload_size: usize,
    layout: Layout,
    ops: BlockOps,
}

/// Header and payload laid out contiguously.
#[repr(C)]
pub(crate) struct ObjectBlock<T> {
    header: ObjectHeader,
    payload: T,
}

impl ObjectHeader {
    /// Current reference count.
    pub fn refcount(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    /// Add a reference unless the count already reached zero.
    ///
    /// Returns the resulting count.
    pub fn try_retain(&self) -> Option<usize> {
        self.refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                if count == 0 {
                    None
                } else {
                    count.checked_add(1)
                }
            })
            .ok()
            .map(|prev| prev + 1)
    }

    /// Drop a reference unless the count is already zero.
    ///
    /// Returns the resulting count. Exactly one caller observes `Some(0)`.
    pub fn try_release(&self) -> Option<usize> {
        self.refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1))
            .ok()
            .map(|prev| prev - 1)
    }

    pub fn liveness(&self) -> Liveness {
        Liveness::from(self.alive.load(Ordering::Acquire))
    }

    pub fn is_live(&self) -> bool {
        self.liveness() == Liveness::Live
    }

    /// Publish the object. Called under the bucket write lock.
    pub fn mark_live(&self) {
        self.alive.store(Liveness::Live as u8, Ordering::Release);
    }

    /// One-shot `Live → Dead` flip; the winner owns destruction.
    pub fn mark_dead(&self) -> bool {
        self.alive
            .compare_exchange(
                Liveness::Live as u8,
                Liveness::Dead as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn identifier(&self) -> String {
        self.identifier.lock().clone()
    }

    pub fn identifier_matches(&self, identifier: &str) -> bool {
        *self.identifier.lock() == identifier
    }

    pub fn set_identifier(&self, identifier: String) {
        *self.identifier.lock() = identifier;
    }

    pub fn payload_address(&self) -> usize {
        self.payload.as_ptr() as usize
    }

    pub fn payload_ptr(&self) -> NonNull<u8> {
        self.payload
    }

    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    /// Borrow the payload for its type destructor.
    ///
    /// # Safety
    ///
    /// The caller must own destruction (won `mark_dead`) and the block must
    /// not have been freed.
    pub unsafe fn payload_mut<'a>(&self) -> &'a mut dyn Any {
        &mut *(self.ops.payload_any)(self.payload)
    }
}

/// Pointer to a header stored in a bucket list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HeaderPtr(NonNull<ObjectHeader>);

// SAFETY: headers are only reached through bucket lists whose locks order all
// access against unlinking, and the block is freed only after unlinking.
unsafe impl Send for HeaderPtr {}
unsafe impl Sync for HeaderPtr {}

impl HeaderPtr {
    /// Dereference the header.
    ///
    /// # Safety
    ///
    /// The block must still be allocated: either the pointer was read from a
    /// bucket list whose lock is held, or the caller owns destruction.
    pub unsafe fn header<'a>(self) -> &'a ObjectHeader {
        &*self.0.as_ptr()
    }

    pub fn address(self) -> usize {
        self.0.as_ptr() as usize
    }

    pub(crate) fn as_ptr(self) -> *mut ObjectHeader {
        self.0.as_ptr()
    }
}

/// Layout of the block for a payload of type `T`.
pub(crate) fn block_layout<T>() -> Layout {
    Layout::new::<ObjectBlock<T>>()
}

/// Initialise a freshly allocated block in place.
///
/// # Safety
///
/// `raw` must point to writable, uninitialised memory laid out as
/// `block_layout::<T>()`.
pub(crate) unsafe fn init_block<T: Any>(
    raw: NonNull<ObjectBlock<T>>,
    object_type: ObjectType,
    identifier: String,
    value: T,
) -> HeaderPtr {
    let block = raw.as_ptr();
    let payload = std::ptr::addr_of_mut!((*block).payload);
    payload.write(value);
    std::ptr::addr_of_mut!((*block).header).write(ObjectHeader {
        refcount: AtomicUsize::new(1),
        alive: AtomicU8::new(Liveness::Constructing as u8),
        object_type,
        identifier: Mutex::new(identifier),
        payload: NonNull::new_unchecked(payload).cast(),
        payload_size: std::mem::size_of::<T>(),
        layout: block_layout::<T>(),
        ops: BlockOps::of::<T>(),
    });
    // repr(C): the header sits at offset 0
    HeaderPtr(raw.cast())
}

/// Drop the payload and the header in place.
///
/// Returns the block layout so the caller can release the memory.
///
/// # Safety
///
/// The caller owns destruction and nothing else references the block.
pub(crate) unsafe fn drop_block(ptr: HeaderPtr) -> Layout {
    let header = ptr.as_ptr();
    let layout = (*header).layout;
    let ops = (*header).ops;
    let payload = (*header).payload;
    (ops.drop_payload)(payload);
    std::ptr::drop_in_place(header);
    layout
}

/// Copy `identifier` bounded to `capacity` bytes, cut on a char boundary.
pub(crate) fn bounded_identifier(identifier: &str, capacity: usize) -> String {
    if identifier.len() <= capacity {
        return identifier.to_owned();
    }
    let mut end = capacity;
    while !identifier.is_char_boundary(end) {
        end -= 1;
    }
    identifier[..end].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_identifier() {
        assert_eq!(bounded_identifier("SEP0011223344", 32), "SEP0011223344");
        assert_eq!(bounded_identifier("abcdef", 4), "abcd");
        // 'é' is two bytes; never split it
        assert_eq!(bounded_identifier("aé", 2), "a");
        assert_eq!(bounded_identifier("abc", 0), "");
    }

    #[test]
    fn test_liveness_from_u8() {
        assert_eq!(Liveness::from(0), Liveness::Constructing);
        assert_eq!(Liveness::from(1), Liveness::Live);
        assert_eq!(Liveness::from(2), Liveness::Dead);
    }
}
