//! Concurrency and rate admission control for the prober (§4.2).
//!
//! A [`Gate`] is a named semaphore; a [`GateSet`] composes the global gate,
//! an optional global RPS stagger, and first-match-wins per-pattern gates
//! parsed from `SERVICE_LIMITS_JSON`.
//!
//! ```rust
//! use pingtower_gates::Gate;
//!
//! # async fn example() {
//! let gate = Gate::global(10);
//! let permit = gate.acquire().await.unwrap();
//! // ... probe the target while holding `permit` ...
//! drop(permit);
//! # }
//! ```

pub mod error;
pub mod events;
pub mod gate;
pub mod pattern;

pub use error::GateError;
pub use events::GateEvent;
pub use gate::{Gate, GateBuilder, GatePermit};
pub use pattern::{parse_service_limits, GateSet, RawLimitRule};
