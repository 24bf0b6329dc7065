//! The periodic control loop (§4.3): drains manually-queued probes ahead of
//! scheduled ones, runs occasional TTL cleanup, and dispatches due targets
//! through their gate with a jittered `next_due` and initial delay.

use crate::config::Config;
use crate::metrics;
use crate::model::{Target, TargetId};
use crate::notify::{Alert, CompositeNotifier, Level};
use crate::prober::Prober;
use crate::store::Store;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use pingtower_core::clock::due_jitter;
use pingtower_gates::GateSet;
use pingtower_incident::{IncidentEvent, IncidentRegistry, Severity, Transition};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

/// Run the incident-engine's escalation/open/close evaluation against the
/// last 5 stored results, per §4.4.
const FAILURE_STREAK_WINDOW: usize = 5;

/// Roughly every tenth tick, TTL cleanup runs (§4.3).
const TTL_CLEANUP_EVERY_N_TICKS: u64 = 10;

/// Owns the scheduling loop: target discovery, dispatch, incident
/// evaluation and notification. One instance runs for the process lifetime.
pub struct Scheduler {
    store: Arc<dyn Store>,
    prober: Prober,
    gate_set: GateSet,
    registry: IncidentRegistry<TargetId>,
    notifier: CompositeNotifier,
    tick: std::time::Duration,
    ttl_cleanup: std::time::Duration,
    drain_deadline: std::time::Duration,
    next_due: Mutex<HashMap<TargetId, DateTime<Utc>>>,
    manual_tx: mpsc::UnboundedSender<TargetId>,
    manual_rx: Mutex<mpsc::UnboundedReceiver<TargetId>>,
    stop: watch::Sender<bool>,
    tick_count: AtomicU64,
}

impl Scheduler {
    pub fn new(
        config: &Config,
        store: Arc<dyn Store>,
        prober: Prober,
        gate_set: GateSet,
        notifier: CompositeNotifier,
    ) -> Self {
        let (manual_tx, manual_rx) = mpsc::unbounded_channel();
        let (stop, _) = watch::channel(false);
        Self {
            store,
            prober,
            gate_set,
            registry: IncidentRegistry::new(),
            notifier,
            tick: config.tick,
            ttl_cleanup: config.ttl_cleanup,
            drain_deadline: config.drain_deadline,
            next_due: Mutex::new(HashMap::new()),
            manual_tx,
            manual_rx: Mutex::new(manual_rx),
            stop,
            tick_count: AtomicU64::new(0),
        }
    }

    /// Enqueues a target for immediate, out-of-band probing (§4.3 "manual
    /// queue"). Does not disturb the target's regular `next_due`.
    pub fn enqueue_manual(&self, target_id: TargetId) {
        let _ = self.manual_tx.send(target_id);
    }

    /// Signals the run loop to stop: new ticks stop being initiated, and any
    /// dispatch already in flight is given up to `drain_deadline` to finish
    /// before its remaining probes are cancelled (§5 "Cancellation").
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Runs the scheduling loop until [`Scheduler::stop`] is called (§4.3,
    /// §5 "Cancellation").
    pub async fn run(&self) {
        tracing::info!(tick_secs = self.tick.as_secs(), "scheduler started");
        let mut stop_rx = self.stop.subscribe();
        while !*stop_rx.borrow() {
            self.drain_manual_queue().await;
            if let Err(err) = self.tick().await {
                tracing::error!(%err, "scheduler tick failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.tick) => {}
                _ = stop_rx.changed() => {}
            }
        }
        tracing::info!("scheduler stopped");
    }

    /// Races a batch of dispatched probe futures against the stop signal. If
    /// shutdown is requested mid-dispatch, the batch gets up to
    /// `drain_deadline` more to finish before it is dropped, cancelling
    /// whatever probes are still in flight (their gate permits are released
    /// on drop and they never reach `insert_result`) (§5 "Cancellation").
    async fn dispatch<F>(&self, futures: impl IntoIterator<Item = F>)
    where
        F: Future<Output = ()>,
    {
        let mut stop_rx = self.stop.subscribe();
        let batch = futures::future::join_all(futures);
        tokio::pin!(batch);

        if *stop_rx.borrow() {
            let _ = tokio::time::timeout(self.drain_deadline, &mut batch).await;
            return;
        }

        tokio::select! {
            _ = &mut batch => {}
            _ = stop_rx.changed() => {
                tracing::info!(
                    drain_deadline_s = self.drain_deadline.as_secs(),
                    "shutdown requested, draining in-flight probes"
                );
                if tokio::time::timeout(self.drain_deadline, &mut batch).await.is_err() {
                    tracing::warn!("drain deadline elapsed, cancelling remaining in-flight probes");
                }
            }
        }
    }

    async fn drain_manual_queue(&self) {
        let mut target_ids = Vec::new();
        {
            let mut rx = self.manual_rx.lock().await;
            while let Ok(target_id) = rx.try_recv() {
                target_ids.push(target_id);
            }
        }

        metrics::set_manual_queue_size(target_ids.len());
        if target_ids.is_empty() {
            return;
        }

        let mut targets = Vec::with_capacity(target_ids.len());
        for id in target_ids {
            match self.store.get_target(id) {
                Ok(Some(target)) => targets.push(target),
                Ok(None) => {}
                Err(err) => tracing::warn!(target_id = id, %err, "failed to load manually-queued target"),
            }
        }

        let futures = targets.into_iter().enumerate().map(|(index, target)| {
            let delay = self.gate_set.initial_delay(&target.url, index);
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                self.probe_one(target.id).await;
            }
        });
        self.dispatch(futures).await;
    }

    async fn tick(&self) -> Result<(), crate::error::StoreError> {
        let tick_number = self.tick_count.fetch_add(1, Ordering::SeqCst);
        if tick_number % TTL_CLEANUP_EVERY_N_TICKS == 0 {
            let cutoff = Utc::now() - ChronoDuration::from_std(self.ttl_cleanup).unwrap_or(ChronoDuration::zero());
            match self.store.ttl_cleanup(cutoff) {
                Ok(removed) if removed > 0 => tracing::debug!(removed, "ttl cleanup removed old results"),
                Ok(_) => {}
                Err(err) => tracing::warn!(%err, "ttl cleanup failed"),
            }
        }

        let targets = self.store.list_targets()?;
        if targets.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let dues = self.select_due_targets(&targets, now).await;
        self.registry
            .retain(|id| targets.iter().any(|t| &t.id == id))
            .await;
        if dues.is_empty() {
            return Ok(());
        }

        let futures = dues.into_iter().enumerate().map(|(index, target)| {
            let delay = self.gate_set.initial_delay(&target.url, index);
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                self.probe_one(target.id).await;
            }
        });
        self.dispatch(futures).await;
        Ok(())
    }

    async fn select_due_targets(&self, targets: &[Target], now: DateTime<Utc>) -> Vec<Target> {
        let mut next_due = self.next_due.lock().await;

        for target in targets {
            next_due.entry(target.id).or_insert_with(|| now + due_jitter(target.interval_s));
        }

        let dues: Vec<Target> = targets
            .iter()
            .filter(|t| next_due.get(&t.id).map(|due| *due <= now).unwrap_or(false))
            .cloned()
            .collect();

        for target in &dues {
            let interval = ChronoDuration::seconds(target.interval_s.max(1) as i64);
            next_due.insert(target.id, now + interval + due_jitter(target.interval_s));
        }

        dues
    }

    async fn probe_one(&self, target_id: TargetId) {
        let target = match self.store.get_target(target_id) {
            Ok(Some(target)) => target,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(target_id, %err, "failed to load target for probing");
                return;
            }
        };

        let gate = self.gate_set.gate_for(&target.url);
        let permit = match gate.acquire().await {
            Ok(permit) => permit,
            Err(err) => {
                tracing::warn!(target_id, gate = gate.name(), %err, "gate rejected probe");
                return;
            }
        };

        let result = self.prober.probe(target.id, &target.url, target.timeout_s).await;
        drop(permit);

        metrics::record_check(target.id, result.ok, result.status_code, result.latency_ms);

        let ok = result.ok;
        if let Err(err) = self.store.insert_result(result) {
            tracing::warn!(target_id, %err, "failed to persist check result");
        }

        self.evaluate_incident(target.id, ok).await;
    }

    async fn evaluate_incident(&self, target_id: TargetId, ok: bool) {
        let failure_streak = if ok {
            0
        } else {
            match self.store.last_n_results(target_id, FAILURE_STREAK_WINDOW) {
                Ok(rows) => rows.iter().take_while(|r| !r.ok).count() as u32,
                Err(err) => {
                    tracing::warn!(target_id, %err, "failed to read recent results for incident evaluation");
                    return;
                }
            }
        };

        let guard = self.registry.lock(target_id).await;
        let transition = {
            let mut state = guard.state().await;
            state.evaluate(ok, failure_streak, Utc::now())
        };

        self.apply_transition(target_id, transition).await;
    }

    async fn apply_transition(&self, target_id: TargetId, transition: Transition) {
        match transition {
            Transition::NoChange | Transition::FailureRecorded { .. } => {}
            Transition::Opened { fail_count } => {
                if let Err(err) = self.store.open_incident(target_id, Utc::now(), fail_count) {
                    tracing::warn!(target_id, %err, "failed to persist opened incident");
                }
                self.notify(target_id, IncidentEvent::Opened {
                    target_id,
                    timestamp: std::time::Instant::now(),
                    fail_count,
                })
                .await;
            }
            Transition::Closed => {
                if let Ok(Some(open)) = self.store.get_open_incident(target_id) {
                    if let Err(err) = self.store.close_incident(open.id, Utc::now()) {
                        tracing::warn!(target_id, %err, "failed to persist closed incident");
                    }
                }
                self.notify(target_id, IncidentEvent::Closed {
                    target_id,
                    timestamp: std::time::Instant::now(),
                })
                .await;
            }
            Transition::Escalated { fail_count } => {
                if let Ok(Some(open)) = self.store.get_open_incident(target_id) {
                    if let Err(err) = self.store.increment_fail(open.id) {
                        tracing::warn!(target_id, %err, "failed to persist incident escalation");
                    }
                }
                self.notify(target_id, IncidentEvent::Escalated {
                    target_id,
                    timestamp: std::time::Instant::now(),
                    fail_count,
                })
                .await;
            }
        }

        let open_count = self.store.list_targets().map(|targets| {
            targets
                .iter()
                .filter(|t| matches!(self.store.get_open_incident(t.id), Ok(Some(_))))
                .count()
        });
        if let Ok(count) = open_count {
            metrics::set_incidents_open(count);
        }
    }

    async fn notify(&self, target_id: TargetId, event: IncidentEvent) {
        let (severity, title) = event.severity_and_title();
        let level = match severity {
            Severity::Info => Level::Info,
            Severity::Warn => Level::Warn,
            Severity::Error => Level::Error,
        };
        let message = match &event {
            IncidentEvent::Opened { fail_count, .. } => {
                format!("Target unreachable ({fail_count} consecutive failures)")
            }
            IncidentEvent::Closed { .. } => "Target is reachable again".to_string(),
            IncidentEvent::Escalated { fail_count, .. } => {
                format!("Still failing: {fail_count} consecutive failures")
            }
        };

        self.notifier
            .send(&Alert::new(Some(target_id), level, title, message))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetryConfig, TlsConfig};
    use crate::notify::LogNotifier;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn test_config() -> Config {
        Config {
            global_concurrency: 10,
            global_rps: None,
            tick: Duration::from_secs(10),
            ttl_cleanup: Duration::from_secs(720 * 3600),
            drain_deadline: Duration::from_secs(5),
            retry: RetryConfig {
                max_attempts: 1,
                base_backoff_ms: 200,
                jitter_ms: 100,
            },
            tls: TlsConfig {
                verify: true,
                ca_bundle: None,
                insecure_retry: true,
            },
            service_limits: Vec::new(),
            telegram_bot_token: None,
            telegram_chat_id: None,
            webhook_url: None,
        }
    }

    fn scheduler_for_test(store: Arc<dyn Store>) -> Scheduler {
        let config = test_config();
        let prober = Prober::new(config.retry, config.tls.clone(), "pingtower-test/1.0");
        let gate_set = GateSet::new(config.global_concurrency, config.global_rps, config.service_limits.clone());
        let notifier = CompositeNotifier::new(vec![Box::new(LogNotifier)]);
        Scheduler::new(&config, store, prober, gate_set, notifier)
    }

    #[tokio::test]
    async fn select_due_targets_initializes_next_due_once() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let scheduler = scheduler_for_test(Arc::clone(&store));

        let target = Target {
            id: 1,
            name: "t".into(),
            url: "https://example.com".into(),
            interval_s: 60,
            timeout_s: 5,
            created_at: Utc::now(),
        };

        let now = Utc::now();
        // First scan: the jittered `next_due` is in the future, so it is not due yet.
        let dues = scheduler.select_due_targets(&[target.clone()], now).await;
        assert!(dues.is_empty());

        // Force due by moving `now` well past the jitter window.
        let later = now + ChronoDuration::seconds(60);
        let dues = scheduler.select_due_targets(&[target], later).await;
        assert_eq!(dues.len(), 1);
    }

    #[tokio::test]
    async fn probing_missing_target_does_not_panic() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let scheduler = scheduler_for_test(store);
        scheduler.probe_one(999).await;
    }

    #[tokio::test]
    async fn drain_manual_queue_resolves_and_probes_queued_targets() {
        let memory_store = MemoryStore::new();
        memory_store.put_target(Target {
            id: 1,
            name: "t".into(),
            url: "http://127.0.0.1:0".into(),
            interval_s: 60,
            timeout_s: 1,
            created_at: Utc::now(),
        });
        let store: Arc<dyn Store> = Arc::new(memory_store);
        let scheduler = scheduler_for_test(Arc::clone(&store));

        scheduler.enqueue_manual(1);
        scheduler.drain_manual_queue().await;

        // A result was persisted even though the connection fails, proving
        // the queued id was resolved to its target and actually dispatched
        // (not silently dropped).
        let results = store.last_n_results(1, 1).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn drain_manual_queue_ignores_unknown_target_ids() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let scheduler = scheduler_for_test(store);

        scheduler.enqueue_manual(999);
        scheduler.drain_manual_queue().await;
    }
}
