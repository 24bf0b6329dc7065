//! Events the incident engine emits on open/close/escalate transitions.

use pingtower_core::MonitorEvent;
use std::time::Instant;

/// Severity of a notification, matching the `level` field on the wire
/// notification event (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// An observability/notification event emitted by the incident engine for
/// a single target.
#[derive(Debug, Clone)]
pub enum IncidentEvent {
    /// Three or more consecutive failures opened a new incident.
    Opened {
        target_id: i64,
        timestamp: Instant,
        fail_count: u32,
    },
    /// A success closed the open incident.
    Closed {
        target_id: i64,
        timestamp: Instant,
    },
    /// `fail_count` crossed a multiple of 5 while the incident stayed open,
    /// and enough time had passed since the last escalation to re-notify.
    Escalated {
        target_id: i64,
        timestamp: Instant,
        fail_count: u32,
    },
}

impl IncidentEvent {
    /// Severity and human title/message for this transition, used to build
    /// the outbound notification (§4.6).
    pub fn severity_and_title(&self) -> (Severity, &'static str) {
        match self {
            IncidentEvent::Opened { .. } => (Severity::Error, "Incident opened"),
            IncidentEvent::Closed { .. } => (Severity::Info, "Incident closed"),
            IncidentEvent::Escalated { .. } => (Severity::Error, "Incident escalation"),
        }
    }

    /// The target this event concerns.
    pub fn target_id(&self) -> i64 {
        match self {
            IncidentEvent::Opened { target_id, .. }
            | IncidentEvent::Closed { target_id, .. }
            | IncidentEvent::Escalated { target_id, .. } => *target_id,
        }
    }
}

impl MonitorEvent for IncidentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            IncidentEvent::Opened { .. } => "incident_opened",
            IncidentEvent::Closed { .. } => "incident_closed",
            IncidentEvent::Escalated { .. } => "incident_escalated",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            IncidentEvent::Opened { timestamp, .. }
            | IncidentEvent::Closed { timestamp, .. }
            | IncidentEvent::Escalated { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        "incident-engine"
    }
}
