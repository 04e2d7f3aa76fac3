//! Hashed bucket directory.
//!
//! Objects are indexed by `payload address mod bucket count`. Buckets are
//! created on first use and destroyed again when they drain empty.
//!
//! Lookups read the slot table without locking. Lock order is
//! directory → bucket. A bucket lock is never held while
//! acquiring the directory lock or another bucket's lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::allocators::block::{HeaderPtr, ObjectHeader};
use crate::api::tag::ObjectType;
use crate::sync::atomics::AtomicCounter;
use crate::sync::mutex::Mutex;
use crate::sync::rwlock::RwLock;

/// Contents of one bucket.
pub(crate) struct BucketList {
    /// Headers, newest first.
    pub headers: VecDeque<HeaderPtr>,
    /// Set once the bucket is unlinked from the directory; inserts must
    /// go back to the directory for a fresh bucket.
    pub retired: bool,
}

/// One hash bucket.
pub(crate) struct Bucket {
    index: usize,
    list: RwLock<BucketList>,
}

impl Bucket {
    fn new(index: usize) -> Self {
        Self {
            index,
            list: RwLock::new(BucketList {
                headers: VecDeque::new(),
                retired: false,
            }),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn list(&self) -> &RwLock<BucketList> {
        &self.list
    }

    /// Unlink `ptr`; returns whether the bucket is now empty, or `None`
    /// if `ptr` was not listed.
    pub fn unlink(&self, ptr: HeaderPtr) -> Option<bool> {
        let mut list = self.list.write();
        let pos = list.headers.iter().position(|h| *h == ptr)?;
        list.headers.remove(pos);
        Some(list.headers.is_empty())
    }
}

/// Occupancy summary.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Census {
    pub entries: usize,
    pub buckets_in_use: usize,
    pub max_depth: usize,
}

/// Fixed-size table of lazily created buckets.
///
/// Slots are read without locking. The directory lock serializes bucket
/// creation, bucket destruction and closing.
pub(crate) struct BucketDirectory {
    slots: Box<[ArcSwapOption<Bucket>]>,
    closed: AtomicBool,
    lock: Mutex<()>,
    bucket_count: usize,
    created: AtomicCounter,
    destroyed: AtomicCounter,
}

impl BucketDirectory {
    pub fn new(bucket_count: usize) -> Self {
        let bucket_count = bucket_count.max(1);
        Self {
            slots: (0..bucket_count).map(|_| ArcSwapOption::empty()).collect(),
            closed: AtomicBool::new(false),
            lock: Mutex::new(()),
            bucket_count,
            created: AtomicCounter::default(),
            destroyed: AtomicCounter::default(),
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    pub fn index_for(&self, address: usize) -> usize {
        address % self.bucket_count
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The bucket currently serving `address`, if one exists.
    pub fn existing(&self, address: usize) -> Option<Arc<Bucket>> {
        self.slots[self.index_for(address)].load_full()
    }

    /// The bucket serving `address`, created if absent.
    ///
    /// Returns `None` once the directory has been closed by shutdown. A
    /// bucket handed out just before closing is already retired, so the
    /// caller's insert fails and comes back here.
    pub fn bucket_for(&self, address: usize) -> Option<Arc<Bucket>> {
        if self.is_closed() {
            return None;
        }
        let index = self.index_for(address);
        if let Some(bucket) = self.slots[index].load_full() {
            return Some(bucket);
        }

        let _guard = self.lock.lock();
        if self.is_closed() {
            return None;
        }
        // Re-check: another thread may have created it in between
        if let Some(bucket) = self.slots[index].load_full() {
            return Some(bucket);
        }
        let bucket = Arc::new(Bucket::new(index));
        self.slots[index].store(Some(Arc::clone(&bucket)));
        self.created.increment();
        Some(bucket)
    }

    /// Remove `bucket` from the directory if it is still installed and empty.
    pub fn maybe_destroy_bucket(&self, bucket: &Arc<Bucket>) -> bool {
        let _guard = self.lock.lock();
        if self.is_closed() {
            return false;
        }

        let slot = &self.slots[bucket.index()];
        let installed = matches!(&*slot.load(), Some(current) if Arc::ptr_eq(current, bucket));
        if !installed {
            return false;
        }

        {
            let mut list = bucket.list().write();
            if !list.headers.is_empty() {
                return false;
            }
            list.retired = true;
        }

        slot.store(None);
        self.destroyed.increment();
        true
    }

    fn installed(&self) -> impl Iterator<Item = Arc<Bucket>> + '_ {
        self.slots.iter().filter_map(|slot| slot.load_full())
    }

    /// Visit every header in bucket order under the bucket read locks.
    pub fn for_each(&self, mut f: impl FnMut(usize, HeaderPtr, &ObjectHeader)) {
        for bucket in self.installed() {
            let list = bucket.list().read();
            for &ptr in list.headers.iter() {
                // SAFETY: blocks are freed only after being unlinked under the write lock
                let header = unsafe { ptr.header() };
                f(bucket.index(), ptr, header);
            }
        }
    }

    pub fn census(&self) -> Census {
        let mut census = Census::default();
        for bucket in self.installed() {
            let depth = bucket.list().read().headers.len();
            census.buckets_in_use += 1;
            census.entries += depth;
            census.max_depth = census.max_depth.max(depth);
        }
        census
    }

    /// Close the directory for good and claim every live object.
    ///
    /// Objects are claimed type by type in `order`; a claim flips the alive
    /// marker, so an object already being finalized by a concurrent release
    /// is left for that thread to unlink and free. Buckets are retired and
    /// dropped from the table.
    pub fn close(&self, order: &[ObjectType]) -> Vec<(usize, HeaderPtr)> {
        let _guard = self.lock.lock();
        self.closed.store(true, Ordering::Release);

        let buckets: Vec<_> = self.installed().collect();
        let mut claimed = Vec::new();
        for &object_type in order {
            for bucket in &buckets {
                let mut list = bucket.list().write();
                list.headers.retain(|&ptr| {
                    // SAFETY: we hold the write lock; nobody can free it under us
                    let header = unsafe { ptr.header() };
                    if header.object_type() == object_type && header.mark_dead() {
                        claimed.push((bucket.index(), ptr));
                        false
                    } else {
                        true
                    }
                });
            }
        }

        for slot in self.slots.iter() {
            if let Some(bucket) = slot.swap(None) {
                bucket.list().write().retired = true;
                self.destroyed.increment();
            }
        }

        claimed
    }

    pub fn buckets_created(&self) -> u64 {
        self.created.get()
    }

    pub fn buckets_destroyed(&self) -> u64 {
        self.destroyed.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocators::heap::ObjectHeap;

    #[test]
    fn test_lazy_creation_is_shared() {
        let dir = BucketDirectory::new(7);
        assert!(dir.existing(3).is_none());

        let a = dir.bucket_for(3).unwrap();
        let b = dir.bucket_for(10).unwrap(); // 10 % 7 == 3
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.index(), 3);
        assert_eq!(dir.buckets_created(), 1);
    }

    #[test]
    fn test_empty_bucket_destroyed_once() {
        let dir = BucketDirectory::new(7);
        let bucket = dir.bucket_for(5).unwrap();

        assert!(dir.maybe_destroy_bucket(&bucket));
        assert!(bucket.list().read().retired);
        assert!(dir.existing(5).is_none());

        // A stale handle must not remove the replacement bucket
        let fresh = dir.bucket_for(5).unwrap();
        assert!(!Arc::ptr_eq(&fresh, &bucket));
        assert!(!dir.maybe_destroy_bucket(&bucket));
        assert!(dir.existing(5).is_some());
        assert_eq!(dir.buckets_destroyed(), 1);
    }

    #[test]
    fn test_closed_directory_refuses_buckets() {
        let dir = BucketDirectory::new(3);
        let bucket = dir.bucket_for(1).unwrap();
        assert!(dir.close(&ObjectType::DRAIN_ORDER).is_empty());
        assert!(bucket.list().read().retired);
        assert!(dir.bucket_for(1).is_none());
        assert!(dir.existing(1).is_none());
        assert_eq!(dir.census().buckets_in_use, 0);
    }

    #[test]
    fn test_unlink_reports_missing_header() {
        let heap = ObjectHeap::new(false);
        let ptr = heap.alloc_block(ObjectType::Line, "l".to_string(), 0u32).unwrap();

        let dir = BucketDirectory::new(3);
        let bucket = dir.bucket_for(ptr.address()).unwrap();
        bucket.list().write().headers.push_front(ptr);

        assert_eq!(bucket.unlink(ptr), Some(true));
        assert_eq!(bucket.unlink(ptr), None);

        unsafe { heap.free_block(ptr) };
        assert_eq!(heap.allocated_bytes(), 0);
    }

    #[test]
    fn test_lookup_sees_bucket_without_directory_lock() {
        let dir = BucketDirectory::new(5);
        let created = dir.bucket_for(2).unwrap();

        // Lookups never touch the directory lock
        let _held = dir.lock.lock();
        let found = dir.existing(7).unwrap();
        assert!(Arc::ptr_eq(&created, &found));
        assert!(Arc::ptr_eq(&dir.bucket_for(12).unwrap(), &created));
    }

    #[test]
    fn test_zero_buckets_clamped() {
        let dir = BucketDirectory::new(0);
        assert_eq!(dir.bucket_count(), 1);
        assert_eq!(dir.index_for(12345), 0);
    }
}
