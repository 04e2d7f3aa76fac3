//! Diagnostic context: call site and thread awareness.

use std::cell::Cell;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source location of a public registry call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    /// Source file of the caller.
    pub file: &'static str,
    /// Line of the caller.
    pub line: u32,
    /// Column of the caller.
    pub column: u32,
    /// Registry operation that was called.
    pub operation: &'static str,
}

impl CallSite {
    /// Capture the location of the nearest `#[track_caller]` boundary.
    #[track_caller]
    pub fn caller(operation: &'static str) -> Self {
        let location = Location::caller();
        Self {
            file: location.file(),
            line: location.line(),
            column: location.column(),
            operation,
        }
    }

    /// Call site for work the registry does on its own behalf.
    pub(crate) const fn internal(operation: &'static str) -> Self {
        Self {
            file: "-",
            line: 0,
            column: 0,
            operation,
        }
    }
}

impl std::fmt::Display for CallSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{} in {}", self.file, self.line, self.column, self.operation)
    }
}

static NEXT_THREAD_NUMBER: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_NUMBER: Cell<u64> = const { Cell::new(0) };
}

/// Small, stable number for the calling thread, assigned on first use.
pub fn thread_number() -> u64 {
    THREAD_NUMBER.with(|n| {
        if n.get() == 0 {
            n.set(NEXT_THREAD_NUMBER.fetch_add(1, Ordering::Relaxed));
        }
        n.get()
    })
}

/// Diagnostic context containing runtime state.
#[derive(Debug, Clone)]
pub struct DiagContext {
    /// Where the offending call came from.
    pub call_site: CallSite,
    /// Calling thread number.
    pub thread_number: u64,
    /// Thread name (if available).
    pub thread_name: Option<String>,
    /// Address of the object involved.
    pub address: Option<usize>,
    /// Captured backtrace, when enabled.
    pub backtrace: Option<String>,
}

impl DiagContext {
    /// Capture the current thread for `call_site`.
    pub fn capture(call_site: CallSite) -> Self {
        Self {
            call_site,
            thread_number: thread_number(),
            thread_name: std::thread::current().name().map(String::from),
            address: None,
            backtrace: None,
        }
    }

    /// Attach the object address.
    pub fn with_address(mut self, address: usize) -> Self {
        self.address = Some(address);
        self
    }

    /// Attach a backtrace.
    pub fn with_backtrace(mut self, backtrace: String) -> Self {
        self.backtrace = Some(backtrace);
        self
    }

    /// Format context for diagnostic output.
    pub fn format(&self) -> String {
        let mut parts = Vec::new();

        if let Some(address) = self.address {
            parts.push(format!("object={:#x}", address));
        }

        parts.push(format!("at {}", self.call_site));

        if let Some(ref name) = self.thread_name {
            parts.push(format!("thread=\"{}\" ({})", name, self.thread_number));
        } else {
            parts.push(format!("thread={}", self.thread_number));
        }

        let mut out = parts.join(", ");
        if let Some(ref backtrace) = self.backtrace {
            out.push('\n');
            out.push_str(backtrace);
        }
        out
    }
}

impl std::fmt::Display for DiagContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.format())
    }
}
