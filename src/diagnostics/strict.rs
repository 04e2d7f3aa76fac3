//! Strict mode: turn diagnostics into panics, for CI.

use std::sync::atomic::{AtomicU8, Ordering};

use super::kind::DiagnosticKind;

/// Strict mode behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StrictMode {
    /// Just report, don't panic.
    Warn = 0,
    /// Panic on errors.
    PanicOnError = 1,
    /// Panic on errors and warnings.
    PanicOnWarning = 2,
}

impl From<u8> for StrictMode {
    fn from(val: u8) -> Self {
        match val {
            1 => StrictMode::PanicOnError,
            2 => StrictMode::PanicOnWarning,
            _ => StrictMode::Warn,
        }
    }
}

static STRICT_MODE: AtomicU8 = AtomicU8::new(0);

/// Set the strict mode.
pub fn set_strict_mode(mode: StrictMode) {
    STRICT_MODE.store(mode as u8, Ordering::Relaxed);
}

/// Get the current strict mode.
pub fn strict_mode() -> StrictMode {
    StrictMode::from(STRICT_MODE.load(Ordering::Relaxed))
}

/// Whether a diagnostic of `kind` is fatal under the current mode.
pub fn should_panic_for(kind: DiagnosticKind) -> bool {
    is_fatal(strict_mode(), kind)
}

fn is_fatal(mode: StrictMode, kind: DiagnosticKind) -> bool {
    match (mode, kind) {
        (StrictMode::Warn, _) | (_, DiagnosticKind::Note) => false,
        (StrictMode::PanicOnError, DiagnosticKind::Warning) => false,
        _ => true,
    }
}

/// RAII guard for temporarily setting strict mode.
pub struct StrictModeGuard {
    previous: StrictMode,
}

impl StrictModeGuard {
    /// Create a new guard that sets strict mode.
    pub fn new(mode: StrictMode) -> Self {
        let previous = strict_mode();
        set_strict_mode(mode);
        Self { previous }
    }

    /// Create a guard that enables panic-on-error.
    pub fn panic_on_error() -> Self {
        Self::new(StrictMode::PanicOnError)
    }
}

impl Drop for StrictModeGuard {
    fn drop(&mut self) {
        set_strict_mode(self.previous);
    }
}

fn parse_mode(val: &str) -> StrictMode {
    match val.to_lowercase().as_str() {
        "1" | "error" | "true" => StrictMode::PanicOnError,
        "2" | "warning" | "all" => StrictMode::PanicOnWarning,
        _ => StrictMode::Warn,
    }
}

/// Initialize strict mode from the `REFCOUNT_STRICT` environment variable.
///
/// - "0" or "warn" -> Warn
/// - "1" or "error" -> PanicOnError
/// - "2" or "warning" -> PanicOnWarning
pub fn init_from_env() {
    if let Ok(val) = std::env::var("REFCOUNT_STRICT") {
        set_strict_mode(parse_mode(&val));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("ERROR"), StrictMode::PanicOnError);
        assert_eq!(parse_mode("2"), StrictMode::PanicOnWarning);
        assert_eq!(parse_mode("bogus"), StrictMode::Warn);
    }

    #[test]
    fn test_fatal_levels() {
        assert!(!is_fatal(StrictMode::Warn, DiagnosticKind::Error));
        assert!(is_fatal(StrictMode::PanicOnError, DiagnosticKind::Error));
        assert!(!is_fatal(StrictMode::PanicOnError, DiagnosticKind::Warning));
        assert!(is_fatal(StrictMode::PanicOnWarning, DiagnosticKind::Warning));
        assert!(!is_fatal(StrictMode::PanicOnWarning, DiagnosticKind::Note));
    }

    #[test]
    fn test_guard_restores_previous_mode() {
        // Warn -> Warn keeps parallel tests unaffected
        let before = strict_mode();
        {
            let _guard = StrictModeGuard::new(StrictMode::Warn);
            assert_eq!(strict_mode(), StrictMode::Warn);
        }
        assert_eq!(strict_mode(), before);
    }
}
