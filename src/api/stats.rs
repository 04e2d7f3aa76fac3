//! Directory statistics and listings.

use crate::allocators::block::Liveness;
use crate::api::tag::ObjectType;
use crate::sync::atomics::{AtomicCounter, AtomicGauge};

/// Snapshot of registry activity.
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    /// Objects currently present in the directory.
    pub entries: usize,
    /// Configured number of hash buckets.
    pub bucket_count: usize,
    /// Buckets that currently exist.
    pub buckets_in_use: usize,
    /// Longest bucket list.
    pub max_depth: usize,
    /// `entries / bucket_count`.
    pub fill_factor: f64,
    /// Objects allocated and not yet destroyed.
    pub live_objects: usize,
    /// High-water mark of `live_objects`.
    pub peak_live_objects: usize,
    pub allocations: u64,
    pub destructions: u64,
    /// Destroyed by shutdown with references still outstanding.
    pub forced_destructions: u64,
    pub invalid_references: u64,
    pub buckets_created: u64,
    pub buckets_destroyed: u64,
    /// Bytes held by object blocks.
    pub allocated_bytes: usize,
}

impl std::fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Registry Statistics:")?;
        writeln!(f, "  Entries:        {}", self.entries)?;
        writeln!(f, "  Buckets:        {} ({} in use)", self.bucket_count, self.buckets_in_use)?;
        writeln!(f, "  Max depth:      {}", self.max_depth)?;
        writeln!(f, "  Fill factor:    {:.2}", self.fill_factor)?;
        writeln!(f, "  Live objects:   {} (peak {})", self.live_objects, self.peak_live_objects)?;
        writeln!(f, "  Allocations:    {}", self.allocations)?;
        writeln!(f, "  Destructions:   {} ({} forced)", self.destructions, self.forced_destructions)?;
        writeln!(f, "  Invalid refs:   {}", self.invalid_references)?;
        writeln!(f, "  Heap:           {} bytes", self.allocated_bytes)?;
        Ok(())
    }
}

/// One object as seen by [`ObjectRegistry::entries`](crate::ObjectRegistry::entries).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub bucket: usize,
    pub object_type: ObjectType,
    pub identifier: String,
    /// Header address, as accepted by `force_release`.
    pub header_address: usize,
    pub payload_address: usize,
    pub refcount: usize,
    pub liveness: Liveness,
    pub payload_size: usize,
}

impl std::fmt::Display for ObjectEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:>5} {:<11} {:<32} {:#016x} {:>4} {:?} {}",
            self.bucket,
            self.object_type.name(),
            self.identifier,
            self.header_address,
            self.refcount,
            self.liveness,
            self.payload_size
        )
    }
}

/// Registry-wide counters.
#[derive(Default)]
pub(crate) struct RegistryCounters {
    pub allocations: AtomicCounter,
    pub destructions: AtomicCounter,
    pub forced: AtomicCounter,
    pub invalid_references: AtomicCounter,
    pub live: AtomicGauge,
    pub peak_live: AtomicGauge,
}

impl RegistryCounters {
    /// Count a block before it is published, so a racing destruction
    /// never sees the gauge at zero.
    pub fn on_reserve(&self) {
        let live = self.live.add(1);
        self.peak_live.update_max(live);
    }

    /// The reserved block was never published.
    pub fn on_abandon(&self) {
        self.live.sub(1);
    }

    pub fn on_publish(&self) {
        self.allocations.increment();
    }

    pub fn on_destroy(&self, forced: bool) {
        self.destructions.increment();
        if forced {
            self.forced.increment();
        }
        self.live.sub(1);
    }
}
