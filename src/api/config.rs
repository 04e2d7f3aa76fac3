//! Registry configuration.

use std::path::PathBuf;

/// Default number of hash buckets (prime).
pub const DEFAULT_BUCKET_COUNT: usize = 563;

/// Default identifier bound in bytes.
pub const DEFAULT_IDENTIFIER_CAPACITY: usize = 32;

/// Where audit records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditTarget {
    /// No audit log.
    Disabled,
    /// Keep the newest records in memory (see `ObjectRegistry::drain_audit`).
    Memory,
    /// Append to a text file, truncated when the registry starts.
    File(PathBuf),
}

/// Configuration for the object registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Number of hash buckets (default: 563)
    ///
    /// Keep this above the peak live object count so the fill factor stays
    /// under 1.0.
    pub bucket_count: usize,

    /// Maximum identifier length in bytes (default: 32)
    pub identifier_capacity: usize,

    /// Audit log destination
    pub audit: AuditTarget,

    /// Pending records that trigger a write to the audit file (default: 1)
    pub audit_flush_threshold: usize,

    /// Records kept by the in-memory audit log
    pub audit_memory_capacity: usize,

    /// Fill factor above which `health_check` warns
    pub fill_factor_warning: f64,

    /// Enable debug features (memory poisoning, backtraces)
    pub debug_mode: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            bucket_count: DEFAULT_BUCKET_COUNT,
            identifier_capacity: DEFAULT_IDENTIFIER_CAPACITY,
            audit: AuditTarget::Disabled,
            audit_flush_threshold: 1,
            audit_memory_capacity: 4096,
            fill_factor_warning: 1.0,
            debug_mode: cfg!(feature = "debug"),
        }
    }
}

impl RegistryConfig {
    /// Create a minimal config for testing or constrained environments.
    pub fn minimal() -> Self {
        Self {
            bucket_count: 31,
            audit_memory_capacity: 256,
            debug_mode: false,
            ..Self::default()
        }
    }

    /// Create a config for leak hunting: in-memory audit and debug checks.
    pub fn debug() -> Self {
        Self {
            audit: AuditTarget::Memory,
            debug_mode: true,
            ..Self::default()
        }
    }

    /// Load a config from the environment, starting from the defaults.
    ///
    /// - `REFCOUNT_HASH_SIZE`: bucket count
    /// - `REFCOUNT_AUDIT_LOG`: audit file path (`memory` for the in-memory log)
    /// - `REFCOUNT_DEBUG`: `1`/`true` enables debug mode
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(count) = std::env::var("REFCOUNT_HASH_SIZE")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            config = config.with_bucket_count(count);
        }

        if let Ok(path) = std::env::var("REFCOUNT_AUDIT_LOG") {
            config.audit = match path.trim() {
                "" => AuditTarget::Disabled,
                "memory" => AuditTarget::Memory,
                other => AuditTarget::File(PathBuf::from(other)),
            };
        }

        if let Ok(val) = std::env::var("REFCOUNT_DEBUG") {
            config.debug_mode = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        config
    }

    /// Builder pattern: set bucket count (clamped to at least 1).
    pub fn with_bucket_count(mut self, count: usize) -> Self {
        self.bucket_count = count.max(1);
        self
    }

    /// Builder pattern: set identifier bound.
    pub fn with_identifier_capacity(mut self, capacity: usize) -> Self {
        self.identifier_capacity = capacity;
        self
    }

    /// Builder pattern: write the audit log to a file.
    pub fn with_audit_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit = AuditTarget::File(path.into());
        self
    }

    /// Builder pattern: keep the audit log in memory.
    pub fn with_memory_audit(mut self) -> Self {
        self.audit = AuditTarget::Memory;
        self
    }

    /// Builder pattern: set audit flush threshold (clamped to at least 1).
    pub fn with_audit_flush_threshold(mut self, threshold: usize) -> Self {
        self.audit_flush_threshold = threshold.max(1);
        self
    }

    /// Builder pattern: set the fill factor warning level.
    pub fn with_fill_factor_warning(mut self, factor: f64) -> Self {
        self.fill_factor_warning = factor;
        self
    }

    /// Builder pattern: enable debug mode.
    pub fn with_debug(mut self, enable: bool) -> Self {
        self.debug_mode = enable;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.bucket_count, DEFAULT_BUCKET_COUNT);
        assert_eq!(config.identifier_capacity, 32);
        assert_eq!(config.audit, AuditTarget::Disabled);
    }

    #[test]
    fn test_bucket_count_clamped() {
        assert_eq!(RegistryConfig::default().with_bucket_count(0).bucket_count, 1);
    }

    #[test]
    fn test_builders() {
        let config = RegistryConfig::minimal()
            .with_audit_log("/tmp/refs")
            .with_audit_flush_threshold(0)
            .with_debug(true);
        assert_eq!(config.audit, AuditTarget::File(PathBuf::from("/tmp/refs")));
        assert_eq!(config.audit_flush_threshold, 1);
        assert!(config.debug_mode);
    }
}
