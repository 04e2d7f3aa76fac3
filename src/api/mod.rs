//! Public API for refcount-registry.
//!
//! This module contains all user-facing types and functions.
//! Most users should only interact with types from this module.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod object_ref;
pub mod registry;
pub mod scope;
pub mod stats;
pub mod tag;
