//! Build script for refcount-registry.
//!
//! Warns about feature combinations that are easy to ship by accident.

use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_DEBUG");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_LOG");

    let debug_enabled = env::var("CARGO_FEATURE_DEBUG").is_ok();
    let log_enabled = env::var("CARGO_FEATURE_LOG").is_ok();
    let diagnostics_enabled = env::var("CARGO_FEATURE_DIAGNOSTICS").is_ok();

    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let is_release = profile == "release";

    // --- Debug Features ---
    if debug_enabled && is_release {
        emit_warning("'debug' feature enabled in a release build");
        emit_note("freed blocks are poisoned and invalid references capture backtraces");
        emit_note("this costs time on every destruction; disable it for production");
    }

    // --- Diagnostics routing ---
    if !log_enabled && !diagnostics_enabled && is_release {
        emit_warning("neither 'log' nor 'diagnostics' is enabled");
        emit_note("release builds will report invalid references only through DiagnosticSink");
    }
}

fn emit_note(msg: &str) {
    println!("cargo:warning=[refcount-registry]    {}", msg);
}

fn emit_warning(msg: &str) {
    println!("cargo:warning=[refcount-registry] ⚠️  {}", msg);
}
