//! The object registry.
//!
//! Every managed object lives in one heap block (header + payload) and is
//! indexed in the bucket of its payload address. The refcount is the only
//! authority on lifetime: the release that takes it to zero unlinks the
//! object, runs its type destructor and frees the block.
//!
//! Refcounts are only touched while the bucket's read lock is held.
//! Unlinking needs the write lock, so a block can never be freed under a
//! thread that found it by address.

use std::any::Any;
use std::io;
use std::sync::Arc;

use crate::allocators::block::{self, HeaderPtr, ObjectHeader};
use crate::allocators::heap::ObjectHeap;
use crate::api::config::RegistryConfig;
use crate::api::error::RegistryError;
use crate::api::lifecycle::{RunState, RunStateCell, ShutdownReport};
use crate::api::object_ref::ObjectRef;
use crate::api::scope::AutoRelease;
use crate::api::stats::{ObjectEntry, RegistryCounters, RegistryStats};
use crate::api::tag::ObjectType;
use crate::core::directory::{Bucket, BucketDirectory};
use crate::core::types::{Destructor, TypeDescriptor, TypeRegistry};
use crate::diagnostics::audit::{AuditEvent, AuditLog, AuditRecord};
use crate::diagnostics::context::{CallSite, DiagContext};
use crate::diagnostics::emit::{emit_to, DiagnosticSink};
use crate::diagnostics::kind::{self, Diagnostic};
use crate::diagnostics::macros::{category_trace, lifecycle_info, lifecycle_warn};

/// Result of looking up a payload address.
enum Lookup<R> {
    Found(R),
    /// Present but already claimed for destruction.
    Dead,
    Missing,
}

/// What a release did to the object.
enum Released {
    Count(usize, Snapshot),
    /// This thread dropped the last reference and owns destruction.
    Last(Arc<Bucket>, HeaderPtr),
    /// Count reached zero but the object was already claimed.
    Stranded(Snapshot),
}

/// Header fields copied out under the bucket lock, for tracing.
struct Snapshot {
    object_type: ObjectType,
    identifier: Option<String>,
}

/// Concurrent registry of reference-counted objects.
///
/// # Example
///
/// ```rust
/// use std::any::Any;
/// use refcount_registry::{ObjectRegistry, ObjectType, RegistryConfig};
///
/// struct Device {
///     name: String,
/// }
///
/// fn destroy_device(_registry: &ObjectRegistry, payload: &mut dyn Any) {
///     if let Some(device) = payload.downcast_mut::<Device>() {
///         device.name.clear();
///     }
/// }
///
/// let registry = ObjectRegistry::new(RegistryConfig::default());
/// registry.init().unwrap();
///
/// let device = registry
///     .allocate(ObjectType::Device, "SEP0011", Device { name: "lobby".into() }, Some(destroy_device))
///     .unwrap();
/// let extra = registry.retain(device).unwrap();
///
/// registry.release(extra).unwrap();
/// registry.release(device).unwrap(); // destroyed here
///
/// assert!(registry.shutdown().is_clean());
/// ```
pub struct ObjectRegistry {
    config: RegistryConfig,
    state: RunStateCell,
    types: TypeRegistry,
    directory: BucketDirectory,
    heap: ObjectHeap,
    audit: AuditLog,
    counters: RegistryCounters,
    sink: Option<Arc<dyn DiagnosticSink>>,
    #[cfg(feature = "debug")]
    traces: crate::debug::backtrace::AllocationTraces,
}

impl ObjectRegistry {
    /// Create a stopped registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            state: RunStateCell::new(),
            types: TypeRegistry::new(),
            directory: BucketDirectory::new(config.bucket_count),
            heap: ObjectHeap::new(config.debug_mode),
            audit: AuditLog::new(&config),
            counters: RegistryCounters::default(),
            sink: None,
            #[cfg(feature = "debug")]
            traces: crate::debug::backtrace::AllocationTraces::new(),
            config,
        }
    }

    /// Create a stopped registry that also reports to `sink`.
    pub fn with_sink(config: RegistryConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        let mut registry = Self::new(config);
        registry.sink = Some(sink);
        registry
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state.get() == RunState::Running
    }

    /// Start accepting objects.
    ///
    /// Opens the audit log if one is configured; a log that cannot be
    /// opened is reported and left disabled.
    pub fn init(&self) -> Result<(), RegistryError> {
        self.state
            .transition(RunState::Stopped, RunState::Running)
            .map_err(RegistryError::AlreadyStarted)?;

        crate::diagnostics::strict::init_from_env();

        if let Err(err) = self.audit.open(&self.config.audit) {
            lifecycle_warn!("audit log {:?} unavailable: {}", self.config.audit, err);
        }

        lifecycle_info!(
            "object registry running ({} buckets, audit {:?})",
            self.directory.bucket_count(),
            self.config.audit
        );
        Ok(())
    }

    /// Stop the registry and destroy everything still alive.
    ///
    /// Objects are destroyed type by type in [`ObjectType::DRAIN_ORDER`],
    /// whatever their refcount. Each one is counted in the report as a
    /// leak. A stopped registry moves straight to `Destroyed`; a registry
    /// that is already shutting down or destroyed returns an empty report.
    pub fn shutdown(&self) -> ShutdownReport {
        let mut report = ShutdownReport::default();

        loop {
            match self.state.get() {
                RunState::Running => {
                    if self
                        .state
                        .transition(RunState::Running, RunState::ShuttingDown)
                        .is_ok()
                    {
                        break;
                    }
                }
                RunState::Stopped => {
                    if self
                        .state
                        .transition(RunState::Stopped, RunState::Destroyed)
                        .is_ok()
                    {
                        return report;
                    }
                }
                RunState::ShuttingDown | RunState::Destroyed => return report,
            }
        }

        lifecycle_info!("shutting down object registry");

        let site = CallSite::internal("shutdown");
        for (bucket, ptr) in self.directory.close(&ObjectType::DRAIN_ORDER) {
            // SAFETY: claimed by close(); unlinked and owned by us
            let header = unsafe { ptr.header() };
            let object_type = header.object_type();
            lifecycle_warn!(
                "cleanup of {} '{}' at {:#x} (bucket {}, refcount {})",
                object_type,
                header.identifier(),
                header.payload_address(),
                bucket,
                header.refcount()
            );

            #[cfg(feature = "debug")]
            if let Some(trace) = self.traces.record_free(header.payload_address()) {
                lifecycle_warn!("{} allocated at:\n{}", object_type, trace);
            }

            report.record(object_type);
            self.destroy(ptr, &site, true);
        }

        if report.is_clean() {
            lifecycle_info!("clean shutdown");
        } else {
            self.report(&kind::RC301, Some(&report.to_string()));
        }

        if let Err(err) = self.audit.close() {
            lifecycle_warn!("audit log close failed: {}", err);
        }

        self.state.set(RunState::Destroyed);
        report
    }

    /// Allocate and register a new object with refcount 1.
    ///
    /// `destructor` is registered for `object_type` unless the type already
    /// has one; the first registration wins for the registry's lifetime.
    /// `identifier` is truncated to the configured capacity.
    #[track_caller]
    pub fn allocate<T: Any + Send + Sync>(
        &self,
        object_type: ObjectType,
        identifier: &str,
        value: T,
        destructor: Option<Destructor>,
    ) -> Result<ObjectRef<T>, RegistryError> {
        let site = CallSite::caller("allocate");
        self.check_running(&site, None)?;

        let identifier = block::bounded_identifier(identifier, self.config.identifier_capacity);
        let audit_identifier = self.audit.is_enabled().then(|| identifier.clone());
        let Some(ptr) = self.heap.alloc_block(object_type, identifier, value) else {
            let size = block::block_layout::<T>().size();
            self.report(&kind::RC002, Some(&format!("{} bytes for {}", size, object_type)));
            return Err(RegistryError::OutOfMemory { size });
        };

        if let Some(destructor) = destructor {
            self.types.register_if_absent(object_type, destructor);
        }

        // The header must not be touched once published: shutdown may free
        // it before this function returns
        // SAFETY: freshly allocated, not yet shared
        let header = unsafe { ptr.header() };
        let payload = header.payload_ptr();
        let address = header.payload_address();

        #[cfg(feature = "debug")]
        if self.config.debug_mode {
            self.traces.record_alloc(address);
        }

        self.counters.on_reserve();
        if let Err(state) = self.publish(ptr, address) {
            self.counters.on_abandon();
            #[cfg(feature = "debug")]
            self.traces.record_free(address);
            // SAFETY: never published, so nobody else can reach it
            unsafe { self.heap.free_block(ptr) };
            return Err(self.not_running(state, &site, Some(address)));
        }
        self.counters.on_publish();

        category_trace!(object_type.category(), "{} {:#x} constructed at {}", object_type, address, site);
        if let Some(identifier) = audit_identifier {
            self.audit.record(
                AuditRecord::new(AuditEvent::Constructed, address, 1, &site)
                    .with_object(1, object_type.name(), identifier),
            );
        }

        Ok(ObjectRef::new(payload.cast()))
    }

    /// Insert a new block at the head of its bucket.
    fn publish(&self, ptr: HeaderPtr, address: usize) -> Result<(), RunState> {
        loop {
            let Some(bucket) = self.directory.bucket_for(address) else {
                return Err(self.state.get());
            };

            let mut list = bucket.list().write();
            if list.retired {
                // Lost a race with bucket cleanup; fetch the replacement
                continue;
            }
            let state = self.state.get();
            if state != RunState::Running {
                return Err(state);
            }
            // SAFETY: we still own the unpublished block
            unsafe { ptr.header() }.mark_live();
            list.headers.push_front(ptr);
            return Ok(());
        }
    }

    /// Take an additional reference.
    #[track_caller]
    pub fn retain<T>(&self, object: ObjectRef<T>) -> Result<ObjectRef<T>, RegistryError> {
        self.retain_at(object.address(), CallSite::caller("retain"))?;
        Ok(object)
    }

    /// Take an additional reference that is released when the guard drops.
    #[track_caller]
    pub fn retain_scoped<T: 'static>(
        &self,
        object: ObjectRef<T>,
    ) -> Result<AutoRelease<'_, T>, RegistryError> {
        let site = CallSite::caller("retain_scoped");
        self.retain_at(object.address(), site)?;
        Ok(AutoRelease::new(self, object, site))
    }

    /// Drop one reference; the last one destroys the object.
    #[track_caller]
    pub fn release<T>(&self, object: ObjectRef<T>) -> Result<(), RegistryError> {
        self.release_at(object.address(), CallSite::caller("release"))
    }

    /// Point `slot` at `new`, retaining `new` before releasing the old value.
    ///
    /// Assigning the value already in the slot does nothing. If `new` cannot
    /// be retained the slot is left untouched. The slot is updated even when
    /// releasing the old value fails; that error is still returned.
    #[track_caller]
    pub fn replace<T>(
        &self,
        slot: &mut Option<ObjectRef<T>>,
        new: Option<ObjectRef<T>>,
    ) -> Result<(), RegistryError> {
        self.replace_at(slot, new, CallSite::caller("replace"))
    }

    /// Release the value in `slot` and leave it empty.
    #[track_caller]
    pub fn clear<T>(&self, slot: &mut Option<ObjectRef<T>>) -> Result<(), RegistryError> {
        self.replace_at(slot, None, CallSite::caller("clear"))
    }

    fn replace_at<T>(
        &self,
        slot: &mut Option<ObjectRef<T>>,
        new: Option<ObjectRef<T>>,
        site: CallSite,
    ) -> Result<(), RegistryError> {
        if *slot == new {
            return Ok(());
        }
        if let Some(new) = new {
            self.retain_at(new.address(), site)?;
        }
        match std::mem::replace(slot, new) {
            Some(old) => self.release_at(old.address(), site),
            None => Ok(()),
        }
    }

    /// Change an object's display identifier.
    #[track_caller]
    pub fn update_identifier<T>(
        &self,
        object: ObjectRef<T>,
        identifier: &str,
    ) -> Result<(), RegistryError> {
        let address = object.address();
        let identifier = block::bounded_identifier(identifier, self.config.identifier_capacity);

        match self.with_live(address, |_, _, header| header.set_identifier(identifier)) {
            Lookup::Found(()) => Ok(()),
            Lookup::Dead | Lookup::Missing => {
                let context = DiagContext::capture(CallSite::caller("update_identifier"))
                    .with_address(address);
                self.report(&kind::RC103, Some(&context.format()));
                Err(RegistryError::InvalidReference { address })
            }
        }
    }

    /// Release one reference of the object listed at `header_address`.
    ///
    /// `identifier` must match the listing too. Returns false when no live
    /// object matches or the registry is not running.
    #[track_caller]
    pub fn force_release(&self, header_address: usize, identifier: &str) -> bool {
        let site = CallSite::caller("force_release");

        let mut target = None;
        self.directory.for_each(|_, ptr, header| {
            if ptr.address() == header_address && header.is_live() && header.identifier_matches(identifier) {
                target = Some(header.payload_address());
            }
        });

        match target {
            Some(address) => {
                lifecycle_warn!("force release of '{}' at {:#x}", identifier, address);
                self.release_at(address, site).is_ok()
            }
            None => false,
        }
    }

    /// Every object currently in the directory, in bucket order.
    pub fn entries(&self) -> Vec<ObjectEntry> {
        let mut entries = Vec::new();
        self.directory.for_each(|bucket, ptr, header| {
            entries.push(ObjectEntry {
                bucket,
                object_type: header.object_type(),
                identifier: header.identifier(),
                header_address: ptr.address(),
                payload_address: header.payload_address(),
                refcount: header.refcount(),
                liveness: header.liveness(),
                payload_size: header.payload_size(),
            });
        });
        entries
    }

    pub fn stats(&self) -> RegistryStats {
        let census = self.directory.census();
        let bucket_count = self.directory.bucket_count();
        RegistryStats {
            entries: census.entries,
            bucket_count,
            buckets_in_use: census.buckets_in_use,
            max_depth: census.max_depth,
            fill_factor: census.entries as f64 / bucket_count as f64,
            live_objects: self.counters.live.get(),
            peak_live_objects: self.counters.peak_live.get(),
            allocations: self.counters.allocations.get(),
            destructions: self.counters.destructions.get(),
            forced_destructions: self.counters.forced.get(),
            invalid_references: self.counters.invalid_references.get(),
            buckets_created: self.directory.buckets_created(),
            buckets_destroyed: self.directory.buckets_destroyed(),
            allocated_bytes: self.heap.allocated_bytes(),
        }
    }

    /// Warn (RC401) when the fill factor exceeds the configured limit.
    ///
    /// Returns true when the directory is healthy.
    pub fn health_check(&self) -> bool {
        let stats = self.stats();
        if stats.fill_factor <= self.config.fill_factor_warning {
            return true;
        }
        let context = format!(
            "fill factor {:.2} ({} entries / {} buckets, max depth {})",
            stats.fill_factor, stats.entries, stats.bucket_count, stats.max_depth
        );
        self.report(&kind::RC401, Some(&context));
        false
    }

    /// Write pending audit records out.
    pub fn flush_audit(&self) -> io::Result<()> {
        self.audit.flush()
    }

    /// Take the records held by an in-memory audit log.
    pub fn drain_audit(&self) -> Vec<AuditRecord> {
        self.audit.drain()
    }

    pub fn type_descriptor(&self, object_type: ObjectType) -> TypeDescriptor {
        self.types.descriptor(object_type)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    pub(crate) fn retain_at(&self, address: usize, site: CallSite) -> Result<(), RegistryError> {
        self.check_running(&site, Some(address))?;

        let lookup = self.with_live(address, |_, _, header| {
            header.try_retain().map(|count| (count, self.snapshot(header)))
        });

        match lookup {
            Lookup::Found(Some((count, snapshot))) => {
                self.trace_change(address, 1, count, &snapshot, &site);
                Ok(())
            }
            // Count already hit zero; the releaser is about to destroy it
            Lookup::Found(None) | Lookup::Dead => {
                self.report_dead(address, &site);
                Err(self.invalid_reference(address, 1, &site))
            }
            Lookup::Missing => Err(self.invalid_reference(address, 1, &site)),
        }
    }

    pub(crate) fn release_at(&self, address: usize, site: CallSite) -> Result<(), RegistryError> {
        self.check_running(&site, Some(address))?;

        let lookup = self.with_live(address, |bucket, ptr, header| self.release_header(bucket, ptr, header));

        match lookup {
            Lookup::Found(Some(Released::Count(count, snapshot))) => {
                self.trace_change(address, -1, count, &snapshot, &site);
                Ok(())
            }
            Lookup::Found(Some(Released::Last(bucket, ptr))) => {
                self.finalize(bucket, ptr, &site);
                Ok(())
            }
            Lookup::Found(Some(Released::Stranded(snapshot))) => {
                self.trace_change(address, -1, 0, &snapshot, &site);
                let context = DiagContext::capture(site).with_address(address);
                self.internal_error(&format!(
                    "{} released to zero after being claimed, {}",
                    snapshot.object_type,
                    context.format()
                ));
                Ok(())
            }
            Lookup::Found(None) | Lookup::Dead => {
                self.report_dead(address, &site);
                Err(self.invalid_reference(address, -1, &site))
            }
            Lookup::Missing => Err(self.invalid_reference(address, -1, &site)),
        }
    }

    /// Drop one reference from a live header. Called under the bucket read lock.
    fn release_header(&self, bucket: &Arc<Bucket>, ptr: HeaderPtr, header: &ObjectHeader) -> Option<Released> {
        let count = header.try_release()?;
        if count > 0 {
            return Some(Released::Count(count, self.snapshot(header)));
        }
        if header.mark_dead() {
            Some(Released::Last(Arc::clone(bucket), ptr))
        } else {
            Some(Released::Stranded(self.snapshot(header)))
        }
    }

    /// Run `f` on the live header for `address` with its bucket read-locked.
    fn with_live<R>(
        &self,
        address: usize,
        f: impl FnOnce(&Arc<Bucket>, HeaderPtr, &ObjectHeader) -> R,
    ) -> Lookup<R> {
        let Some(bucket) = self.directory.existing(address) else {
            return Lookup::Missing;
        };

        let list = bucket.list().read();
        for &ptr in list.headers.iter() {
            // SAFETY: the read lock keeps listed blocks allocated
            let header = unsafe { ptr.header() };
            if header.payload_address() != address {
                continue;
            }
            if !header.is_live() {
                return Lookup::Dead;
            }
            return Lookup::Found(f(&bucket, ptr, header));
        }
        Lookup::Missing
    }

    /// Unlink and destroy an object whose last reference was just released.
    fn finalize(&self, bucket: Arc<Bucket>, ptr: HeaderPtr, site: &CallSite) {
        let Some(now_empty) = bucket.unlink(ptr) else {
            // SAFETY: this thread won the dead flip; the block is still allocated
            let address = unsafe { ptr.header() }.payload_address();
            let context = DiagContext::capture(*site).with_address(address);
            self.internal_error(&format!(
                "bucket {} lost a finalized object, {}",
                bucket.index(),
                context.format()
            ));
            self.destroy(ptr, site, false);
            return;
        };
        self.destroy(ptr, site, false);

        if now_empty && self.is_running() {
            self.directory.maybe_destroy_bucket(&bucket);
        }
    }

    /// Run the type destructor and free the block.
    fn destroy(&self, ptr: HeaderPtr, site: &CallSite, forced: bool) {
        // SAFETY: the caller won the dead flip and unlinked the block
        let header = unsafe { ptr.header() };
        let object_type = header.object_type();
        let address = header.payload_address();

        category_trace!(object_type.category(), "{} {:#x} destroyed at {}", object_type, address, site);
        if self.audit.is_enabled() {
            self.audit.record(
                AuditRecord::new(AuditEvent::Destroyed, address, -1, site)
                    .with_object(0, object_type.name(), header.identifier()),
            );
        }

        if let Some(destructor) = self.types.destructor(object_type) {
            // SAFETY: we own destruction and the block is still allocated
            destructor(self, unsafe { header.payload_mut() });
        }

        #[cfg(feature = "debug")]
        self.traces.record_free(address);

        // SAFETY: unlinked, destructed, and nobody else can reach it
        unsafe { self.heap.free_block(ptr) };
        self.counters.on_destroy(forced);
    }

    fn snapshot(&self, header: &ObjectHeader) -> Snapshot {
        Snapshot {
            object_type: header.object_type(),
            identifier: self.audit.is_enabled().then(|| header.identifier()),
        }
    }

    fn trace_change(&self, address: usize, delta: isize, count: usize, snapshot: &Snapshot, site: &CallSite) {
        let object_type = snapshot.object_type;
        category_trace!(
            object_type.category(),
            "{} {:#x} {:+} -> {} at {}",
            object_type,
            address,
            delta,
            count,
            site
        );
        if let Some(identifier) = &snapshot.identifier {
            self.audit.record(
                AuditRecord::new(AuditEvent::Changed, address, delta, site)
                    .with_object(count, object_type.name(), identifier.clone()),
            );
        }
    }

    fn check_running(&self, site: &CallSite, address: Option<usize>) -> Result<(), RegistryError> {
        match self.state.get() {
            RunState::Running => Ok(()),
            state => Err(self.not_running(state, site, address)),
        }
    }

    fn not_running(&self, state: RunState, site: &CallSite, address: Option<usize>) -> RegistryError {
        if state == RunState::ShuttingDown {
            // Destructors run by the drain routinely release their children
            category_trace!(
                crate::api::tag::DebugCategory::High,
                "{} ignored while shutting down at {}",
                site.operation,
                site
            );
        } else {
            let mut context = DiagContext::capture(*site);
            if let Some(address) = address {
                context = context.with_address(address);
            }
            self.report(&kind::RC001, Some(&format!("state {}, {}", state, context.format())));
        }
        RegistryError::NotRunning(state)
    }

    fn report_dead(&self, address: usize, site: &CallSite) {
        let context = DiagContext::capture(*site).with_address(address);
        self.report(&kind::RC102, Some(&context.format()));
    }

    fn invalid_reference(&self, address: usize, delta: isize, site: &CallSite) -> RegistryError {
        self.counters.invalid_references.increment();
        self.audit
            .record(AuditRecord::new(AuditEvent::Invalid, address, delta, site));

        #[allow(unused_mut)]
        let mut context = DiagContext::capture(*site).with_address(address);
        #[cfg(feature = "debug")]
        if self.config.debug_mode {
            context = context.with_backtrace(crate::debug::backtrace::capture());
        }

        self.report(&kind::RC101, Some(&context.format()));
        RegistryError::InvalidReference { address }
    }

    fn internal_error(&self, detail: &str) {
        lifecycle_warn!("internal error: {}", detail);
        self.report(&kind::RC901, Some(detail));
    }

    fn report(&self, diag: &Diagnostic, context: Option<&str>) {
        emit_to(self.sink.as_deref(), diag, context);
    }
}

impl Drop for ObjectRegistry {
    fn drop(&mut self) {
        if self.state.get() == RunState::Running {
            self.shutdown();
        }
    }
}

impl std::fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("state", &self.state.get())
            .field("bucket_count", &self.directory.bucket_count())
            .field("live_objects", &self.counters.live.get())
            .finish()
    }
}
