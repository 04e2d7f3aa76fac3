//! Backtrace capture for invalid references and leaked objects.

use std::collections::HashMap;

use crate::sync::mutex::Mutex;

/// Capture the current stack as text.
pub fn capture() -> String {
    format!("{:?}", backtrace::Backtrace::new())
}

/// Where each live object was allocated, keyed by payload address.
///
/// Consulted when shutdown has to destroy an object by force, so the leak
/// report can point at the allocation site.
pub struct AllocationTraces {
    traces: Mutex<HashMap<usize, String>>,
}

impl AllocationTraces {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            traces: Mutex::new(HashMap::new()),
        }
    }

    /// Record the allocation site of `address`.
    pub fn record_alloc(&self, address: usize) {
        let trace = capture();
        self.traces.lock().insert(address, trace);
    }

    /// Forget `address`, returning its allocation site if tracked.
    pub fn record_free(&self, address: usize) -> Option<String> {
        self.traces.lock().remove(&address)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.traces.lock().len()
    }
}

impl Default for AllocationTraces {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traces_follow_lifetime() {
        let traces = AllocationTraces::new();
        traces.record_alloc(0x1000);
        assert_eq!(traces.len(), 1);
        assert!(traces.record_free(0x1000).is_some());
        assert!(traces.record_free(0x1000).is_none());
        assert_eq!(traces.len(), 0);
    }
}
