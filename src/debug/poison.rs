//! Memory poisoning for debugging.
//!
//! Fills freed object blocks with a known pattern to expose use-after-free.

/// Pattern used to poison freed memory.
pub const FREED_PATTERN: u8 = 0xCD;

/// Poison a region of memory with the freed pattern.
///
/// # Safety
///
/// The memory region must be valid and writable.
pub unsafe fn poison_freed(ptr: *mut u8, size: usize) {
    std::ptr::write_bytes(ptr, FREED_PATTERN, size);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poison_fills_region() {
        let mut buf = [0u8; 16];
        unsafe { poison_freed(buf.as_mut_ptr(), buf.len()) };
        assert!(buf.iter().all(|b| *b == FREED_PATTERN));
    }
}
