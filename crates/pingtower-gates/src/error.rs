//! Errors surfaced by a [`crate::Gate`] when admission is refused.

use thiserror::Error;

/// Error returned when a gate refuses to admit a probe.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    /// The gate's wait timeout elapsed before a permit became available.
    #[error("gate '{gate}' timed out waiting for a free permit")]
    WaitTimedOut {
        /// Name of the gate that rejected the call.
        gate: String,
    },

    /// The gate's semaphore was closed, which only happens during shutdown.
    #[error("gate '{gate}' is closed")]
    Closed {
        /// Name of the gate that rejected the call.
        gate: String,
    },
}
