//! Errors surfaced by the incident engine.

use thiserror::Error;

/// Error returned when the incident engine cannot consult or update its
/// backing store. Never fatal to the scheduler: the caller logs it and
/// continues (§7 — persistence failures degrade incident accuracy, not
/// availability).
#[derive(Debug, Error)]
pub enum IncidentError {
    #[error("incident store unavailable: {0}")]
    StoreUnavailable(String),
}
