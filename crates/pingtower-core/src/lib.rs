//! Shared infrastructure for the pingtower crates: an event system for
//! observability and the clock/jitter math used by the gates, retry and
//! incident state machine.

pub mod clock;
pub mod events;

pub use events::{EventListener, MonitorEvent};
