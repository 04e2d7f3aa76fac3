//! Internal tracing macros.

/// Trace a refcount transition under the object's debug category target,
/// e.g. `refcount_registry::channel`.
macro_rules! category_trace {
    ($category:expr, $($arg:tt)+) => {{
        #[cfg(feature = "log")]
        {
            log::trace!(target: $category.target(), $($arg)+);
        }
    }};
}

/// Registry lifecycle notice at info level.
macro_rules! lifecycle_info {
    ($($arg:tt)+) => {{
        #[cfg(feature = "log")]
        {
            log::info!(target: "refcount_registry::lifecycle", $($arg)+);
        }
    }};
}

/// Registry lifecycle notice at warn level.
macro_rules! lifecycle_warn {
    ($($arg:tt)+) => {{
        #[cfg(feature = "log")]
        {
            log::warn!(target: "refcount_registry::lifecycle", $($arg)+);
        }
    }};
}

pub(crate) use {category_trace, lifecycle_info, lifecycle_warn};
