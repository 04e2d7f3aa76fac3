//! Registry lifecycle: run states and the shutdown report.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::api::tag::ObjectType;

/// Lifecycle state of an [`ObjectRegistry`](crate::ObjectRegistry).
///
/// `Stopped → Running → ShuttingDown → Destroyed`. Only `Running` accepts
/// allocations, retains and releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    /// Constructed, `init()` not called yet.
    Stopped = 0,
    /// Accepting operations.
    Running = 1,
    /// `shutdown()` is draining the directory.
    ShuttingDown = 2,
    /// Drained; final.
    Destroyed = 3,
}

impl From<u8> for RunState {
    fn from(val: u8) -> Self {
        match val {
            0 => RunState::Stopped,
            1 => RunState::Running,
            2 => RunState::ShuttingDown,
            _ => RunState::Destroyed,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Stopped => "stopped",
            RunState::Running => "running",
            RunState::ShuttingDown => "shutting down",
            RunState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Atomic cell holding a [`RunState`].
pub(crate) struct RunStateCell(AtomicU8);

impl RunStateCell {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(RunState::Stopped as u8))
    }

    pub(crate) fn get(&self) -> RunState {
        RunState::from(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: RunState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move from `from` to `to`; returns the observed state on failure.
    pub(crate) fn transition(&self, from: RunState, to: RunState) -> Result<(), RunState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(RunState::from)
    }
}

/// Outcome of [`ObjectRegistry::shutdown`](crate::ObjectRegistry::shutdown).
///
/// A non-zero `forced` count means some caller leaked references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Objects destroyed regardless of their outstanding refcount.
    pub forced: usize,
    by_type: [usize; ObjectType::COUNT],
}

impl ShutdownReport {
    pub(crate) fn record(&mut self, object_type: ObjectType) {
        self.forced += 1;
        self.by_type[object_type.index()] += 1;
    }

    /// Forced destructions for one type.
    pub fn forced_for(&self, object_type: ObjectType) -> usize {
        self.by_type[object_type.index()]
    }

    /// True when nothing had to be destroyed by force.
    pub fn is_clean(&self) -> bool {
        self.forced == 0
    }
}

impl std::fmt::Display for ShutdownReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_clean() {
            return write!(f, "clean shutdown");
        }
        write!(f, "{} objects forcefully removed (", self.forced)?;
        let mut first = true;
        for ty in ObjectType::DRAIN_ORDER {
            let count = self.forced_for(ty);
            if count == 0 {
                continue;
            }
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", ty, count)?;
            first = false;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        let cell = RunStateCell::new();
        assert_eq!(cell.get(), RunState::Stopped);
        assert!(cell.transition(RunState::Stopped, RunState::Running).is_ok());
        assert_eq!(
            cell.transition(RunState::Stopped, RunState::Running),
            Err(RunState::Running)
        );
        cell.set(RunState::Destroyed);
        assert_eq!(cell.get(), RunState::Destroyed);
    }

    #[test]
    fn test_report_display() {
        let mut report = ShutdownReport::default();
        assert_eq!(report.to_string(), "clean shutdown");

        report.record(ObjectType::Channel);
        report.record(ObjectType::Device);
        report.record(ObjectType::Device);
        assert_eq!(report.forced_for(ObjectType::Device), 2);
        assert_eq!(
            report.to_string(),
            "3 objects forcefully removed (channel: 1, device: 2)"
        );
    }
}
