//! Events emitted while a retry executor runs through its attempts.

use pingtower_core::MonitorEvent;
use std::time::{Duration, Instant};

/// An observability event emitted by [`crate::executor::retry`].
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// An attempt failed in a way the policy considers retryable and a
    /// further attempt will be scheduled.
    RetryScheduled {
        owner: String,
        timestamp: Instant,
        attempt: u32,
        backoff: Duration,
    },
    /// The policy's attempt budget was exhausted without success.
    AttemptsExhausted {
        owner: String,
        timestamp: Instant,
        attempts: u32,
    },
}

impl MonitorEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::RetryScheduled { .. } => "retry_scheduled",
            RetryEvent::AttemptsExhausted { .. } => "attempts_exhausted",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::RetryScheduled { timestamp, .. }
            | RetryEvent::AttemptsExhausted { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        match self {
            RetryEvent::RetryScheduled { owner, .. }
            | RetryEvent::AttemptsExhausted { owner, .. } => owner,
        }
    }
}
