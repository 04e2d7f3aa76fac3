//! Debug utilities for tracking leaks and misuse.
//!
//! Only compiled when the `debug` feature is enabled.

pub(crate) mod backtrace;
pub(crate) mod poison;
