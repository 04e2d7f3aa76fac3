//! Diagnostic emission backend.
//!
//! Diagnostics go to the registry's sink (if any), then to the `log` crate,
//! or to stderr when `log` is disabled.

use std::sync::atomic::{AtomicBool, Ordering};

use super::kind::{Diagnostic, DiagnosticKind};
use super::strict::should_panic_for;
use crate::sync::mutex::Mutex;

/// Global flag to suppress diagnostic output (for testing).
static DIAGNOSTICS_SUPPRESSED: AtomicBool = AtomicBool::new(false);

/// Suppress all log and stderr output. Sinks still receive diagnostics.
pub fn suppress_diagnostics(suppress: bool) {
    DIAGNOSTICS_SUPPRESSED.store(suppress, Ordering::Relaxed);
}

/// Check if diagnostics are suppressed.
pub fn is_suppressed() -> bool {
    DIAGNOSTICS_SUPPRESSED.load(Ordering::Relaxed)
}

/// Emit to `sink` first, then to the global outputs.
pub(crate) fn emit_to(sink: Option<&dyn DiagnosticSink>, diag: &Diagnostic, context: Option<&str>) {
    if let Some(sink) = sink {
        sink.emit(diag, context);
    }

    if !is_suppressed() {
        #[cfg(feature = "log")]
        emit_to_log(diag, context);

        #[cfg(all(not(feature = "log"), any(debug_assertions, feature = "diagnostics")))]
        emit_to_stderr(diag, context);
    }

    if should_panic_for(diag.kind) {
        match context {
            Some(context) => panic!(
                "[refcount-registry][{}] {}\nContext: {}\nStrict mode enabled - diagnostics are fatal.",
                diag.code, diag.message, context
            ),
            None => panic!(
                "[refcount-registry][{}] {}\nStrict mode enabled - diagnostics are fatal.",
                diag.code, diag.message
            ),
        }
    }
}

#[cfg(all(not(feature = "log"), any(debug_assertions, feature = "diagnostics")))]
fn emit_to_stderr(diag: &Diagnostic, context: Option<&str>) {
    use std::io::Write;

    // Notes are debug chatter; keep stderr for real problems
    if diag.kind == DiagnosticKind::Note {
        return;
    }

    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(
        stderr,
        "[refcount-registry][{}] {}: {}",
        diag.code,
        diag.kind.prefix(),
        diag.message
    );
    if let Some(context) = context {
        let _ = writeln!(stderr, "  context: {}", context);
    }
    if let Some(note) = diag.note {
        let _ = writeln!(stderr, "  note: {}", note);
    }
    if let Some(help) = diag.help {
        let _ = writeln!(stderr, "  help: {}", help);
    }
}

#[cfg(feature = "log")]
fn emit_to_log(diag: &Diagnostic, context: Option<&str>) {
    const TARGET: &str = "refcount_registry::diagnostics";

    let context = context.map(|c| format!(" ({})", c)).unwrap_or_default();
    match diag.kind {
        DiagnosticKind::Error => log::error!(target: TARGET, "[{}] {}{}", diag.code, diag.message, context),
        DiagnosticKind::Warning => log::warn!(target: TARGET, "[{}] {}{}", diag.code, diag.message, context),
        DiagnosticKind::Note => log::debug!(target: TARGET, "[{}] {}{}", diag.code, diag.message, context),
    }

    if diag.kind != DiagnosticKind::Note {
        if let Some(note) = diag.note {
            log::info!(target: TARGET, "  note: {}", note);
        }
        if let Some(help) = diag.help {
            log::info!(target: TARGET, "  help: {}", help);
        }
    }
}

/// A diagnostic sink trait for custom output.
pub trait DiagnosticSink: Send + Sync {
    /// Handle a diagnostic and its runtime context, if any.
    fn emit(&self, diag: &Diagnostic, context: Option<&str>);
}

/// A simple sink that collects diagnostics.
#[derive(Default)]
pub struct CollectingSink {
    diagnostics: Mutex<Vec<(Diagnostic, Option<String>)>>,
}

impl CollectingSink {
    /// Create a new collecting sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected diagnostics.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().iter().map(|(d, _)| d.clone()).collect()
    }

    /// Number of collected diagnostics with `code`.
    pub fn count(&self, code: &str) -> usize {
        self.diagnostics.lock().iter().filter(|(d, _)| d.code == code).count()
    }

    /// Contexts recorded with `code`, in emission order.
    pub fn contexts(&self, code: &str) -> Vec<String> {
        self.diagnostics
            .lock()
            .iter()
            .filter(|(d, _)| d.code == code)
            .filter_map(|(_, c)| c.clone())
            .collect()
    }

    /// Clear collected diagnostics.
    pub fn clear(&self) {
        self.diagnostics.lock().clear();
    }

    /// Check if any errors were collected.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .lock()
            .iter()
            .any(|(d, _)| d.kind == DiagnosticKind::Error)
    }
}

impl DiagnosticSink for CollectingSink {
    fn emit(&self, diag: &Diagnostic, context: Option<&str>) {
        self.diagnostics
            .lock()
            .push((diag.clone(), context.map(String::from)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::kind::{RC101, RC301};

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingSink::new();
        emit_to(Some(&sink), &RC101, Some("thread=1"));
        emit_to(Some(&sink), &RC301, None);

        assert_eq!(sink.diagnostics().len(), 2);
        assert_eq!(sink.count("RC101"), 1);
        assert_eq!(sink.contexts("RC101"), vec!["thread=1".to_string()]);
        assert!(sink.has_errors());

        sink.clear();
        assert_eq!(sink.diagnostics().len(), 0);
        assert!(!sink.has_errors());
    }

    #[test]
    fn test_suppression() {
        suppress_diagnostics(true);
        assert!(is_suppressed());
        suppress_diagnostics(false);
        assert!(!is_suppressed());
    }
}
