//! A semaphore-backed admission gate.
//!
//! A [`Gate`] bounds the number of probes in flight at once. The scheduler
//! holds one global gate (capacity = `GLOBAL_CONCURRENCY`) and, when
//! `SERVICE_LIMITS_JSON` names a pattern with `concurrency > 0`, one
//! additional gate per matching pattern that a probe acquires instead of the
//! global one.

use crate::error::GateError;
use crate::events::GateEvent;
use pingtower_core::events::EventListeners;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Builder for a [`Gate`].
pub struct GateBuilder {
    name: String,
    max_permits: usize,
    max_wait: Option<Duration>,
    event_listeners: EventListeners<GateEvent>,
}

impl GateBuilder {
    /// Creates a builder defaulting to 25 permits and no wait timeout.
    pub fn new() -> Self {
        Self {
            name: "gate".to_string(),
            max_permits: 25,
            max_wait: None,
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the gate's name, used in events, metrics and error messages.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the maximum number of probes this gate admits concurrently.
    pub fn max_permits(mut self, max: usize) -> Self {
        self.max_permits = max.max(1);
        self
    }

    /// Sets how long a caller waits for a free permit before being rejected.
    /// `None` (the default) waits indefinitely.
    pub fn max_wait(mut self, wait: Option<Duration>) -> Self {
        self.max_wait = wait;
        self
    }

    /// Registers a listener for this gate's events.
    pub fn on_event<L>(mut self, listener: L) -> Self
    where
        L: pingtower_core::EventListener<GateEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Builds the gate.
    pub fn build(self) -> Gate {
        #[cfg(feature = "metrics")]
        describe_gate_metrics();

        Gate {
            name: self.name,
            semaphore: Arc::new(Semaphore::new(self.max_permits)),
            max_permits: self.max_permits,
            max_wait: self.max_wait,
            event_listeners: Arc::new(self.event_listeners),
        }
    }
}

impl Default for GateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A concurrency gate: a named semaphore with an optional wait timeout.
#[derive(Clone)]
pub struct Gate {
    name: String,
    semaphore: Arc<Semaphore>,
    max_permits: usize,
    max_wait: Option<Duration>,
    event_listeners: Arc<EventListeners<GateEvent>>,
}

impl Gate {
    /// Starts building a gate.
    pub fn builder() -> GateBuilder {
        GateBuilder::new()
    }

    /// Creates a gate with the given capacity and no wait timeout, the shape
    /// the scheduler uses for the single process-wide global gate.
    pub fn global(max_permits: usize) -> Self {
        Self::builder()
            .name("global")
            .max_permits(max_permits)
            .build()
    }

    /// Name this gate was built with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Permits currently checked out.
    pub fn in_use(&self) -> usize {
        self.max_permits - self.semaphore.available_permits()
    }

    /// Acquires a permit, waiting up to `max_wait` (or indefinitely if unset).
    /// The returned guard releases the permit on drop.
    pub async fn acquire(&self) -> Result<GatePermit, GateError> {
        let acquired = match self.max_wait {
            Some(wait) => tokio::time::timeout(wait, self.semaphore.clone().acquire_owned())
                .await
                .map_err(|_| GateError::WaitTimedOut {
                    gate: self.name.clone(),
                })?,
            None => self.semaphore.clone().acquire_owned().await,
        };

        let permit = acquired.map_err(|_| GateError::Closed {
            gate: self.name.clone(),
        });

        match permit {
            Ok(permit) => {
                let in_use = self.max_permits - self.semaphore.available_permits();
                self.event_listeners.emit(&GateEvent::PermitAcquired {
                    gate_name: self.name.clone(),
                    timestamp: Instant::now(),
                    in_use,
                });

                #[cfg(feature = "metrics")]
                {
                    counter!("pingtower_gate_permits_acquired_total", "gate" => self.name.clone())
                        .increment(1);
                    gauge!("pingtower_gate_permits_in_use", "gate" => self.name.clone())
                        .set(in_use as f64);
                }

                Ok(GatePermit {
                    _permit: permit,
                    gate_name: self.name.clone(),
                    event_listeners: Arc::clone(&self.event_listeners),
                    acquired_at: Instant::now(),
                    #[cfg(feature = "metrics")]
                    gate_name_for_metrics: self.name.clone(),
                })
            }
            Err(err) => {
                self.event_listeners.emit(&GateEvent::PermitRejected {
                    gate_name: self.name.clone(),
                    timestamp: Instant::now(),
                    max_permits: self.max_permits,
                });

                #[cfg(feature = "metrics")]
                counter!("pingtower_gate_permits_rejected_total", "gate" => self.name.clone())
                    .increment(1);

                Err(err)
            }
        }
    }
}

/// A held gate permit. Releases automatically when dropped.
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    gate_name: String,
    event_listeners: Arc<EventListeners<GateEvent>>,
    acquired_at: Instant,
    #[cfg(feature = "metrics")]
    gate_name_for_metrics: String,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.event_listeners.emit(&GateEvent::PermitReleased {
            gate_name: self.gate_name.clone(),
            timestamp: Instant::now(),
            held_for: self.acquired_at.elapsed(),
        });

        #[cfg(feature = "metrics")]
        counter!("pingtower_gate_permits_released_total", "gate" => self.gate_name_for_metrics.clone())
            .increment(1);
    }
}

#[cfg(feature = "metrics")]
fn describe_gate_metrics() {
    use metrics::{describe_counter, describe_gauge};
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        describe_counter!(
            "pingtower_gate_permits_acquired_total",
            "Total permits acquired from a gate"
        );
        describe_counter!(
            "pingtower_gate_permits_rejected_total",
            "Total permit acquisitions rejected by a gate"
        );
        describe_counter!(
            "pingtower_gate_permits_released_total",
            "Total permits released back to a gate"
        );
        describe_gauge!(
            "pingtower_gate_permits_in_use",
            "Permits currently checked out from a gate"
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn acquire_and_release_round_trip() {
        let gate = Gate::global(2);
        assert_eq!(gate.in_use(), 0);

        let p1 = gate.acquire().await.unwrap();
        assert_eq!(gate.in_use(), 1);
        let p2 = gate.acquire().await.unwrap();
        assert_eq!(gate.in_use(), 2);

        drop(p1);
        assert_eq!(gate.in_use(), 1);
        drop(p2);
        assert_eq!(gate.in_use(), 0);
    }

    #[tokio::test]
    async fn never_exceeds_capacity() {
        let gate = Gate::global(2);
        let p1 = gate.acquire().await.unwrap();
        let p2 = gate.acquire().await.unwrap();
        assert_eq!(gate.in_use(), 2);

        // A third acquire must block while both permits are held.
        let blocked = tokio::time::timeout(Duration::from_millis(20), gate.acquire()).await;
        assert!(blocked.is_err());

        drop(p1);
        // Freeing one permit lets a new acquire through, still never above 2.
        let p3 = gate.acquire().await.unwrap();
        assert_eq!(gate.in_use(), 2);

        drop(p2);
        drop(p3);
        assert_eq!(gate.in_use(), 0);
    }

    #[tokio::test]
    async fn wait_timeout_rejects_when_full() {
        let gate = Gate::builder()
            .name("tight")
            .max_permits(1)
            .max_wait(Some(Duration::from_millis(20)))
            .build();

        let _held = gate.acquire().await.unwrap();
        let err = gate.acquire().await.unwrap_err();
        assert_eq!(
            err,
            GateError::WaitTimedOut {
                gate: "tight".to_string()
            }
        );
    }

    #[tokio::test]
    async fn events_fire_on_acquire_and_release() {
        let acquired = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicUsize::new(0));
        let a = Arc::clone(&acquired);
        let r = Arc::clone(&released);

        let gate = Gate::builder()
            .name("observed")
            .max_permits(4)
            .on_event(pingtower_core::events::FnListener::new(move |event: &GateEvent| {
                match event {
                    GateEvent::PermitAcquired { .. } => {
                        a.fetch_add(1, Ordering::SeqCst);
                    }
                    GateEvent::PermitReleased { .. } => {
                        r.fetch_add(1, Ordering::SeqCst);
                    }
                    GateEvent::PermitRejected { .. } => {}
                }
            }))
            .build();

        let permit = gate.acquire().await.unwrap();
        assert_eq!(acquired.load(Ordering::SeqCst), 1);
        drop(permit);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
