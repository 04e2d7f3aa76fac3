//! Object block storage.
//!
//! **These are the only modules that should contain `unsafe` code.**

pub(crate) mod block;
pub(crate) mod heap;
