//! Registry internals: the bucket directory and the type table.

pub(crate) mod directory;
pub(crate) mod types;
