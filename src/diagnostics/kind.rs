//! Diagnostic kinds and the registry's predefined diagnostics.

/// The severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A hard error - something is definitely wrong.
    Error,
    /// A warning - something is probably wrong or suboptimal.
    Warning,
    /// Informational; routed at debug level.
    Note,
}

impl DiagnosticKind {
    /// Get the display prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Note => "note",
        }
    }
}

/// A diagnostic message with code, message, and optional context.
///
/// Diagnostic codes follow the pattern:
/// - `RC0xx` - Lifecycle and allocation
/// - `RC1xx` - Object references
/// - `RC3xx` - Shutdown
/// - `RC4xx` - Directory health
/// - `RC9xx` - Internal errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity level.
    pub kind: DiagnosticKind,
    /// Diagnostic code (e.g., "RC101").
    pub code: &'static str,
    /// Primary message.
    pub message: &'static str,
    /// Optional additional context.
    pub note: Option<&'static str>,
    /// Optional fix suggestion.
    pub help: Option<&'static str>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub const fn error(code: &'static str, message: &'static str) -> Self {
        Self::with_kind(DiagnosticKind::Error, code, message)
    }

    /// Create a new warning diagnostic.
    pub const fn warning(code: &'static str, message: &'static str) -> Self {
        Self::with_kind(DiagnosticKind::Warning, code, message)
    }

    /// Create a new informational diagnostic.
    pub const fn info(code: &'static str, message: &'static str) -> Self {
        Self::with_kind(DiagnosticKind::Note, code, message)
    }

    const fn with_kind(kind: DiagnosticKind, code: &'static str, message: &'static str) -> Self {
        Self {
            kind,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Add a note to this diagnostic.
    pub const fn with_note(mut self, note: &'static str) -> Self {
        self.note = Some(note);
        self
    }

    /// Add a help message to this diagnostic.
    pub const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.kind.prefix(), self.message)
    }
}

// =============================================================================
// Predefined diagnostics (RC0xx - Lifecycle and allocation)
// =============================================================================

/// RC001: Operation on a registry that is not running.
pub const RC001: Diagnostic = Diagnostic::error(
    "RC001",
    "object registry is not running"
).with_note("allocate, retain and release are only accepted between init() and shutdown()")
 .with_help("call init() before use, and stop using references once shutdown() started");

/// RC002: The system allocator refused an object block.
pub const RC002: Diagnostic = Diagnostic::error(
    "RC002",
    "out of memory while allocating an object block"
).with_note("the payload was dropped and nothing was registered");

// =============================================================================
// Predefined diagnostics (RC1xx - References)
// =============================================================================

/// RC101: Retain or release of an unmanaged or destroyed object.
pub const RC101: Diagnostic = Diagnostic::error(
    "RC101",
    "reference to an object that is not managed by this registry"
).with_note("the object was never allocated here, or its last reference was already released")
 .with_help("check for a missing retain or a duplicate release at the call site");

/// RC102: Lookup hit an entry that is already being destroyed.
pub const RC102: Diagnostic = Diagnostic::info(
    "RC102",
    "object already declared dead"
).with_note("the last reference was dropped and destruction is in progress");

/// RC103: Identifier update on an unknown object.
pub const RC103: Diagnostic = Diagnostic::error(
    "RC103",
    "cannot update the identifier of an unmanaged object"
);

// =============================================================================
// Predefined diagnostics (RC3xx - Shutdown)
// =============================================================================

/// RC301: Objects were still referenced at shutdown.
pub const RC301: Diagnostic = Diagnostic::warning(
    "RC301",
    "objects were forcefully removed during shutdown"
).with_note("their reference counts had not reached zero")
 .with_help("enable the audit log to find the missing releases");

// =============================================================================
// Predefined diagnostics (RC4xx - Directory health)
// =============================================================================

/// RC401: The directory is overloaded.
pub const RC401: Diagnostic = Diagnostic::warning(
    "RC401",
    "object directory fill factor exceeds the configured limit"
).with_note("lookups scan longer bucket lists")
 .with_help("raise bucket_count (REFCOUNT_HASH_SIZE), preferably to a prime");

// =============================================================================
// Predefined diagnostics (RC9xx - Internal)
// =============================================================================

/// RC901: Internal registry error.
pub const RC901: Diagnostic = Diagnostic::error(
    "RC901",
    "internal registry invariant violated"
).with_note("this indicates a bug in refcount-registry");
