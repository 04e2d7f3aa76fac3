//! Append-only audit trail of refcount events.
//!
//! Records are pushed onto a lock-free queue by the threads that retain and
//! release, and drained in batches to a file or an in-memory ring. One line
//! per record:
//!
//! ```text
//! pointer,delta,threadId,file,line,function,resultingRefcount,typeName,identifier
//! ```

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_queue::SegQueue;

use super::context::{thread_number, CallSite};
use crate::api::config::{AuditTarget, RegistryConfig};
use crate::sync::mutex::Mutex;

/// What happened to the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    /// Allocated and published.
    Constructed,
    /// Retained or released.
    Changed,
    /// Destructor ran.
    Destroyed,
    /// Retain or release of an unknown address.
    Invalid,
}

/// One audit line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub event: AuditEvent,
    /// Payload address.
    pub pointer: usize,
    pub delta: isize,
    pub thread: u64,
    pub file: &'static str,
    pub line: u32,
    pub function: &'static str,
    /// Count after the change; `None` when unknown.
    pub refcount: Option<usize>,
    pub type_name: Option<&'static str>,
    pub identifier: Option<String>,
}

impl AuditRecord {
    /// Record for the calling thread at `site`.
    pub(crate) fn new(event: AuditEvent, pointer: usize, delta: isize, site: &CallSite) -> Self {
        Self {
            event,
            pointer,
            delta,
            thread: thread_number(),
            file: site.file,
            line: site.line,
            function: site.operation,
            refcount: None,
            type_name: None,
            identifier: None,
        }
    }

    pub(crate) fn with_object(
        mut self,
        refcount: usize,
        type_name: &'static str,
        identifier: String,
    ) -> Self {
        self.refcount = Some(refcount);
        self.type_name = Some(type_name);
        self.identifier = Some(identifier);
        self
    }
}

impl std::fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.delta < 0 { "" } else { "+" };
        write!(
            f,
            "{:#x},{}{},{},{},{},{},",
            self.pointer, sign, self.delta, self.thread, self.file, self.line, self.function
        )?;
        match (self.event, self.refcount) {
            (AuditEvent::Destroyed, _) => f.write_str("**destructor**")?,
            (_, Some(count)) => write!(f, "{}", count)?,
            (_, None) => f.write_str("-")?,
        }
        write!(
            f,
            ",{},{}",
            self.type_name.unwrap_or("-"),
            self.identifier.as_deref().unwrap_or("-")
        )
    }
}

enum Output {
    Disabled,
    Memory(VecDeque<AuditRecord>),
    File(BufWriter<File>),
}

/// Batched audit writer.
pub(crate) struct AuditLog {
    enabled: AtomicBool,
    queue: SegQueue<AuditRecord>,
    pending: AtomicUsize,
    flush_threshold: usize,
    memory_capacity: usize,
    output: Mutex<Output>,
}

impl AuditLog {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            enabled: AtomicBool::new(false),
            queue: SegQueue::new(),
            pending: AtomicUsize::new(0),
            flush_threshold: config.audit_flush_threshold.max(1),
            memory_capacity: config.audit_memory_capacity,
            output: Mutex::new(Output::Disabled),
        }
    }

    /// Start recording to `target`. A file that cannot be created leaves
    /// the log disabled.
    pub fn open(&self, target: &AuditTarget) -> io::Result<()> {
        let output = match target {
            AuditTarget::Disabled => return Ok(()),
            AuditTarget::Memory => Output::Memory(VecDeque::new()),
            AuditTarget::File(path) => Output::File(BufWriter::new(File::create(path)?)),
        };
        *self.output.lock() = output;
        self.enabled.store(true, Ordering::Release);
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn record(&self, record: AuditRecord) {
        if !self.is_enabled() {
            return;
        }
        // Count before pushing so a concurrent flush never pops an uncounted record
        let pending = self.pending.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        self.queue.push(record);
        if pending >= self.flush_threshold {
            // A failed write only loses trace lines
            let _ = self.flush();
        }
    }

    /// Move every queued record to the output.
    pub fn flush(&self) -> io::Result<()> {
        let mut output = self.output.lock();
        let mut result = Ok(());

        while let Some(record) = self.queue.pop() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            match &mut *output {
                Output::Disabled => {}
                Output::Memory(ring) => {
                    if ring.len() == self.memory_capacity {
                        ring.pop_front();
                    }
                    if self.memory_capacity > 0 {
                        ring.push_back(record);
                    }
                }
                Output::File(writer) => {
                    if result.is_ok() {
                        result = writeln!(writer, "{}", record);
                    }
                }
            }
        }

        if let Output::File(writer) = &mut *output {
            result = result.and(writer.flush());
        }
        result
    }

    /// Take the records held in memory, oldest first.
    pub fn drain(&self) -> Vec<AuditRecord> {
        let _ = self.flush();
        match &mut *self.output.lock() {
            Output::Memory(ring) => ring.drain(..).collect(),
            _ => Vec::new(),
        }
    }

    /// Flush and stop recording. Memory records stay readable.
    pub fn close(&self) -> io::Result<()> {
        self.enabled.store(false, Ordering::Release);
        let result = self.flush();
        let mut output = self.output.lock();
        if matches!(*output, Output::File(_)) {
            *output = Output::Disabled;
        }
        result
    }
}
