//! # refcount-registry
//!
//! A concurrent registry of reference-counted objects, built for servers
//! where many threads share long-lived mutable objects (devices, lines,
//! channels) and must never dereference one that was already destroyed.
//!
//! ## Features
//!
//! - Hashed object directory with one read/write lock per bucket
//! - Atomic retain / release / replace; exactly-once destruction
//! - Per-type destructors, registered on first allocation
//! - Ordered shutdown drain with a leak report
//! - Coded diagnostics with call sites, and an optional audit trail
//!
//! ## Quick Start
//!
//! ```rust
//! use refcount_registry::{ObjectRegistry, ObjectType, RegistryConfig};
//!
//! let registry = ObjectRegistry::new(RegistryConfig::default());
//! registry.init().unwrap();
//!
//! let channel = registry.allocate(ObjectType::Channel, "SCCP/100-0001", 0u32, None).unwrap();
//!
//! // Store a counted reference elsewhere
//! let mut owner = None;
//! registry.replace(&mut owner, Some(channel)).unwrap();
//!
//! registry.release(channel).unwrap();
//! registry.clear(&mut owner).unwrap(); // last reference: destroyed
//!
//! assert!(registry.shutdown().is_clean());
//! ```
//!
//! ## Lifetimes
//!
//! A reference count is the only thing that keeps an object alive. The
//! registry cannot break reference cycles: a child that refers back to its
//! parent should hold the parent's identifier, or release its reference
//! from the parent's destructor.

pub mod api;
pub mod diagnostics;

#[allow(dead_code)]
mod allocators;
#[allow(dead_code)]
mod core;
#[allow(dead_code)]
mod sync;

#[cfg(feature = "debug")]
mod debug;

// Re-export public API at crate root for convenience
pub use api::config::{AuditTarget, RegistryConfig, DEFAULT_BUCKET_COUNT, DEFAULT_IDENTIFIER_CAPACITY};
pub use api::error::RegistryError;
pub use api::lifecycle::{RunState, ShutdownReport};
pub use api::object_ref::ObjectRef;
pub use api::registry::ObjectRegistry;
pub use api::scope::AutoRelease;
pub use api::stats::{ObjectEntry, RegistryStats};
pub use api::tag::{DebugCategory, ObjectType};

pub use allocators::block::Liveness;
pub use crate::core::types::{Destructor, TypeDescriptor};

// Diagnostics
pub use diagnostics::{AuditEvent, AuditRecord, CollectingSink, Diagnostic, DiagnosticSink};
