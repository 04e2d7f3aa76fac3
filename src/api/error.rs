//! Registry errors.

use crate::api::lifecycle::RunState;

/// Errors returned by registry operations.
///
/// Every error is also reported through the diagnostics channel before it
/// is returned; the registry itself never aborts on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// Operation attempted while the registry was not running.
    NotRunning(RunState),
    /// The object block could not be allocated.
    OutOfMemory {
        /// Bytes requested for header and payload.
        size: usize,
    },
    /// The address is not a live managed object.
    InvalidReference {
        /// The payload address passed in.
        address: usize,
    },
    /// `init()` on a registry that already left the stopped state.
    AlreadyStarted(RunState),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::NotRunning(state) => write!(f, "registry not running ({})", state),
            RegistryError::OutOfMemory { size } => {
                write!(f, "out of memory allocating {} byte object", size)
            }
            RegistryError::InvalidReference { address } => {
                write!(f, "invalid object reference {:#x}", address)
            }
            RegistryError::AlreadyStarted(state) => {
                write!(f, "registry cannot be started from state {}", state)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
