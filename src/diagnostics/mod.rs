//! Diagnostics, tracing and the audit trail.
//!
//! This module provides:
//! - **Runtime diagnostics**: coded messages routed to a sink, `log`, or stderr
//! - **Strict mode**: optional panic-on-error for CI
//! - **Audit log**: a per-event trace of retains and releases
//!
//! ## Diagnostic Codes
//!
//! | Code  | Meaning                        |
//! |-------|--------------------------------|
//! | RC0xx | Lifecycle and allocation       |
//! | RC1xx | Object references              |
//! | RC3xx | Shutdown                       |
//! | RC4xx | Directory health               |
//! | RC9xx | Internal errors                |

pub mod audit;
pub mod context;
pub mod emit;
pub mod kind;
pub(crate) mod macros;
pub mod strict;

pub use audit::{AuditEvent, AuditRecord};
pub use context::{thread_number, CallSite, DiagContext};
pub use emit::{suppress_diagnostics, CollectingSink, DiagnosticSink};
pub use kind::{Diagnostic, DiagnosticKind};
pub use strict::{init_from_env, set_strict_mode, strict_mode, StrictMode, StrictModeGuard};

pub use kind::{RC001, RC002, RC101, RC102, RC103, RC301, RC401, RC901};
