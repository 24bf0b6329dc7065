//! The per-target incident state machine (§4.4).
//!
//! This is a pure, storage-agnostic transition function: the caller is
//! responsible for consulting the last 5 results to compute the current
//! failure streak and for persisting the resulting state through its own
//! `Store` adapter. Keeping this crate agnostic of the store means its
//! transition logic can be exercised with plain unit and property tests.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// Consecutive failures required to open an incident.
pub const OPEN_THRESHOLD: u32 = 3;

/// An escalation notification fires every time `fail_count` reaches a
/// multiple of this value while the incident stays open.
pub const ESCALATION_INTERVAL: u32 = 5;

/// Minimum spacing between two escalation notifications for the same
/// incident (§9, resolved open question (b)).
pub const MIN_ESCALATION_SPACING: ChronoDuration = ChronoDuration::minutes(5);

/// The in-memory record of a target's currently open incident.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenIncident {
    pub opened_at: DateTime<Utc>,
    pub fail_count: u32,
    pub last_escalated_at: Option<DateTime<Utc>>,
}

/// The outcome of feeding one probe result through the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Nothing changed: either already-healthy-and-ok, or a failure streak
    /// shorter than [`OPEN_THRESHOLD`].
    NoChange,
    /// A new incident was opened.
    Opened { fail_count: u32 },
    /// The open incident was closed.
    Closed,
    /// The open incident's `fail_count` was incremented but did not cross
    /// an escalation boundary (or did, but re-notify spacing suppressed it).
    FailureRecorded { fail_count: u32 },
    /// The open incident escalated and a notification should fire.
    Escalated { fail_count: u32 },
}

/// Per-target incident state. Invariant: `open.is_some()` iff the target
/// currently has an open incident (mirrors the persisted `is_open` flag).
#[derive(Debug, Clone, Default)]
pub struct IncidentState {
    open: Option<OpenIncident>,
}

impl IncidentState {
    /// Starts a target with no open incident.
    pub fn new() -> Self {
        Self { open: None }
    }

    /// Rehydrates state from a persisted open incident, e.g. at process
    /// startup after reading `get_open_incident`.
    pub fn from_open(open: Option<OpenIncident>) -> Self {
        Self { open }
    }

    /// The currently open incident, if any.
    pub fn open(&self) -> Option<&OpenIncident> {
        self.open.as_ref()
    }

    /// Feeds one probe result through the transition rules.
    ///
    /// `failure_streak` is the number of consecutive non-ok results ending
    /// at (and including) this one, as read from the last 5 stored results
    /// (§4.4); it is only consulted when there is no open incident yet.
    pub fn evaluate(&mut self, ok: bool, failure_streak: u32, now: DateTime<Utc>) -> Transition {
        match (&mut self.open, ok) {
            (None, true) => Transition::NoChange,
            (None, false) => {
                if failure_streak >= OPEN_THRESHOLD {
                    self.open = Some(OpenIncident {
                        opened_at: now,
                        fail_count: failure_streak,
                        last_escalated_at: None,
                    });
                    Transition::Opened {
                        fail_count: failure_streak,
                    }
                } else {
                    Transition::NoChange
                }
            }
            (Some(_), true) => {
                self.open = None;
                Transition::Closed
            }
            (Some(incident), false) => {
                incident.fail_count += 1;
                let fail_count = incident.fail_count;

                if fail_count % ESCALATION_INTERVAL == 0 {
                    let should_notify = match incident.last_escalated_at {
                        None => true,
                        Some(last) => now - last >= MIN_ESCALATION_SPACING,
                    };
                    if should_notify {
                        incident.last_escalated_at = Some(now);
                        return Transition::Escalated { fail_count };
                    }
                }

                Transition::FailureRecorded { fail_count }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn no_incident_on_short_failure_streak() {
        let mut state = IncidentState::new();
        assert_eq!(state.evaluate(false, 1, at(0)), Transition::NoChange);
        assert_eq!(state.evaluate(false, 2, at(1)), Transition::NoChange);
        assert!(state.open().is_none());
    }

    #[test]
    fn opens_at_three_consecutive_failures() {
        let mut state = IncidentState::new();
        state.evaluate(false, 1, at(0));
        state.evaluate(false, 2, at(1));
        let transition = state.evaluate(false, 3, at(2));
        assert_eq!(transition, Transition::Opened { fail_count: 3 });
        assert_eq!(state.open().unwrap().fail_count, 3);
    }

    #[test]
    fn fourth_failure_increments_without_reopening() {
        let mut state = IncidentState::new();
        state.evaluate(false, 3, at(0));
        let transition = state.evaluate(false, 4, at(1));
        assert_eq!(transition, Transition::FailureRecorded { fail_count: 4 });
    }

    #[test]
    fn fifth_failure_escalates() {
        let mut state = IncidentState::new();
        state.evaluate(false, 3, at(0));
        state.evaluate(false, 4, at(1));
        let transition = state.evaluate(false, 5, at(2));
        assert_eq!(transition, Transition::Escalated { fail_count: 5 });
    }

    #[test]
    fn success_closes_open_incident() {
        let mut state = IncidentState::new();
        state.evaluate(false, 3, at(0));
        let transition = state.evaluate(true, 0, at(1));
        assert_eq!(transition, Transition::Closed);
        assert!(state.open().is_none());
    }

    #[test]
    fn escalation_respects_minimum_spacing() {
        let mut state = IncidentState::new();
        state.evaluate(false, 3, at(0));
        for n in 4..=9 {
            state.evaluate(false, n, at((n - 3) as i64));
        }
        // fail_count is now 9; escalation triggers at 10 only if spaced far enough.
        let first_escalation = state.evaluate(false, 10, at(7));
        assert_eq!(first_escalation, Transition::Escalated { fail_count: 10 });

        for n in 11..=14 {
            state.evaluate(false, n, at(7 + (n - 10) as i64));
        }
        // fail_count 15 is only 11 seconds after the prior escalation: suppressed.
        let suppressed = state.evaluate(false, 15, at(18));
        assert_eq!(suppressed, Transition::FailureRecorded { fail_count: 15 });

        for n in 16..=19 {
            state.evaluate(false, n, at(18 + (n - 15) as i64));
        }
        // fail_count 20, but far enough past the last *successful* escalation (at t=7).
        let resumed = state.evaluate(false, 20, at(7 + 301));
        assert_eq!(resumed, Transition::Escalated { fail_count: 20 });
    }
}
