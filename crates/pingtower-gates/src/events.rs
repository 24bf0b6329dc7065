//! Events emitted by a [`crate::Gate`] as probes are admitted or rejected.

use pingtower_core::MonitorEvent;
use std::time::{Duration, Instant};

/// An observability event emitted by a gate.
#[derive(Debug, Clone)]
pub enum GateEvent {
    /// A probe acquired a permit and was allowed to proceed.
    PermitAcquired {
        /// Name of the gate instance.
        gate_name: String,
        timestamp: Instant,
        /// Permits currently in use, including this one.
        in_use: usize,
    },
    /// A probe was refused a permit (wait timeout elapsed or gate closed).
    PermitRejected {
        gate_name: String,
        timestamp: Instant,
        max_permits: usize,
    },
    /// A probe released its permit after finishing.
    PermitReleased {
        gate_name: String,
        timestamp: Instant,
        held_for: Duration,
    },
}

impl MonitorEvent for GateEvent {
    fn event_type(&self) -> &'static str {
        match self {
            GateEvent::PermitAcquired { .. } => "permit_acquired",
            GateEvent::PermitRejected { .. } => "permit_rejected",
            GateEvent::PermitReleased { .. } => "permit_released",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            GateEvent::PermitAcquired { timestamp, .. }
            | GateEvent::PermitRejected { timestamp, .. }
            | GateEvent::PermitReleased { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        match self {
            GateEvent::PermitAcquired { gate_name, .. }
            | GateEvent::PermitRejected { gate_name, .. }
            | GateEvent::PermitReleased { gate_name, .. } => gate_name,
        }
    }
}
