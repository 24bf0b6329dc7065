//! The per-target incident state machine (§4.4): open on 3 consecutive
//! failures, close on success, escalate every 5th consecutive failure
//! subject to a 5-minute minimum re-notification spacing.
//!
//! Unlike a traditional circuit breaker, this state machine never gates
//! traffic — it only classifies a stream of probe results into
//! open/close/escalate notifications. [`IncidentState`] is the pure
//! transition function; [`IncidentRegistry`] adds the per-target locking
//! the scheduler needs when probes for different targets complete
//! concurrently.
//!
//! ```
//! use pingtower_incident::{IncidentState, Transition};
//! use chrono::Utc;
//!
//! let mut state = IncidentState::new();
//! state.evaluate(false, 1, Utc::now());
//! state.evaluate(false, 2, Utc::now());
//! let transition = state.evaluate(false, 3, Utc::now());
//! assert_eq!(transition, Transition::Opened { fail_count: 3 });
//! ```

mod error;
mod events;
mod registry;
mod state;

pub use error::IncidentError;
pub use events::{IncidentEvent, Severity};
pub use registry::{IncidentRegistry, OwnedIncidentGuard};
pub use state::{
    IncidentState, OpenIncident, Transition, ESCALATION_INTERVAL, MIN_ESCALATION_SPACING,
    OPEN_THRESHOLD,
};
