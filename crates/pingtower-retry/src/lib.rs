//! Fixed-attempt exponential backoff retry executor (§4.1 retry policy).
//!
//! The prober has one concrete request shape (probe a URL), so this crate
//! is a plain async executor rather than a generic `tower::Service`
//! middleware: callers classify each attempt as [`AttemptOutcome::Done`] or
//! [`AttemptOutcome::Retryable`] and the executor owns the backoff math and
//! sleeping between attempts.
//!
//! ```
//! use pingtower_retry::{retry, AttemptOutcome, RetryPolicy};
//! use pingtower_core::events::EventListeners;
//!
//! # async fn example() {
//! let policy = RetryPolicy::new(3, 100, 50);
//! let listeners = EventListeners::new();
//!
//! let status = retry("example", &policy, &listeners, |attempt| async move {
//!     if attempt < 3 {
//!         AttemptOutcome::Retryable(503)
//!     } else {
//!         AttemptOutcome::Done(200)
//!     }
//! })
//! .await;
//! # let _ = status;
//! # }
//! ```

mod events;
mod executor;
mod policy;

pub use events::RetryEvent;
pub use executor::{retry, AttemptOutcome};
pub use policy::RetryPolicy;
