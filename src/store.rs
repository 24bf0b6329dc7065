//! Persistence seam (§4.5) and the in-process analytics view layered on top
//! of it (§3.1). The scheduler only ever talks to the [`Store`] trait; the
//! in-memory implementation here is the reference backend, modeled on the
//! original SQLAlchemy repository's method surface.

use crate::error::StoreError;
use crate::model::{CheckResult, Incident, Target, TargetId};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

/// Everything the scheduler needs to read and write about targets, probe
/// history and incidents (§4.5).
pub trait Store: Send + Sync {
    fn list_targets(&self) -> Result<Vec<Target>, StoreError>;
    fn get_target(&self, id: TargetId) -> Result<Option<Target>, StoreError>;
    fn insert_result(&self, result: CheckResult) -> Result<(), StoreError>;
    /// Most recent `n` results for a target, newest first.
    fn last_n_results(&self, id: TargetId, n: usize) -> Result<Vec<CheckResult>, StoreError>;
    fn get_open_incident(&self, id: TargetId) -> Result<Option<Incident>, StoreError>;
    fn open_incident(
        &self,
        id: TargetId,
        opened_at: DateTime<Utc>,
        fail_count: u32,
    ) -> Result<Incident, StoreError>;
    fn close_incident(&self, incident_id: i64, closed_at: DateTime<Utc>) -> Result<(), StoreError>;
    fn increment_fail(&self, incident_id: i64) -> Result<(), StoreError>;
    /// Deletes results older than `older_than`. Returns the number removed.
    fn ttl_cleanup(&self, older_than: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Read-only reporting queries, kept separate from [`Store`] because they
/// serve the UI/API surface rather than the scheduler loop (§3.1).
pub trait AnalyticsView: Send + Sync {
    /// Fraction of results in `[now - window, now]` that were `ok`, or
    /// `None` if there are no results in the window.
    fn uptime_ratio(&self, id: TargetId, window: ChronoDuration, now: DateTime<Utc>) -> Option<f64>;
    /// Mean latency of successful probes in the window, or `None` if there
    /// were no successful probes.
    fn avg_latency_ms(&self, id: TargetId, window: ChronoDuration, now: DateTime<Utc>) -> Option<f64>;
    /// Linear-interpolated percentiles of successful-probe latency in the
    /// window. Each requested percentile maps to `None` if there is no data.
    fn latency_percentiles(
        &self,
        id: TargetId,
        window: ChronoDuration,
        now: DateTime<Utc>,
        percentiles: &[u8],
    ) -> HashMap<u8, Option<u64>>;
    fn list_incidents(&self, open_only: bool) -> Vec<Incident>;
}

#[derive(Default)]
struct Inner {
    targets: HashMap<TargetId, Target>,
    results: HashMap<TargetId, Vec<CheckResult>>,
    incidents: HashMap<i64, Incident>,
    next_incident_id: i64,
}

/// In-memory reference [`Store`]/[`AnalyticsView`] implementation (§4.5).
///
/// Results are kept newest-first per target; there is no row cap here
/// beyond [`Store::ttl_cleanup`], which a real deployment should call
/// periodically (the scheduler does, per §4.3).
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Seeds a target, as a test/bootstrap helper; production configuration
    /// would come from a registration API out of scope for this crate (§2).
    pub fn put_target(&self, target: Target) {
        self.inner.write().unwrap().targets.insert(target.id, target);
    }

    fn results_in_window(
        inner: &Inner,
        id: TargetId,
        window: ChronoDuration,
        now: DateTime<Utc>,
    ) -> Vec<CheckResult> {
        let start = now - window;
        inner
            .results
            .get(&id)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.ts >= start && r.ts <= now)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn list_targets(&self) -> Result<Vec<Target>, StoreError> {
        Ok(self.inner.read().unwrap().targets.values().cloned().collect())
    }

    fn get_target(&self, id: TargetId) -> Result<Option<Target>, StoreError> {
        Ok(self.inner.read().unwrap().targets.get(&id).cloned())
    }

    fn insert_result(&self, result: CheckResult) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        let rows = inner.results.entry(result.target_id).or_default();
        rows.insert(0, result);
        Ok(())
    }

    fn last_n_results(&self, id: TargetId, n: usize) -> Result<Vec<CheckResult>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .results
            .get(&id)
            .map(|rows| rows.iter().take(n).cloned().collect())
            .unwrap_or_default())
    }

    fn get_open_incident(&self, id: TargetId) -> Result<Option<Incident>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .incidents
            .values()
            .find(|inc| inc.target_id == id && inc.is_open)
            .cloned())
    }

    fn open_incident(
        &self,
        id: TargetId,
        opened_at: DateTime<Utc>,
        fail_count: u32,
    ) -> Result<Incident, StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner.next_incident_id += 1;
        let incident = Incident {
            id: inner.next_incident_id,
            target_id: id,
            opened_at,
            closed_at: None,
            fail_count,
            is_open: true,
        };
        inner.incidents.insert(incident.id, incident.clone());
        Ok(incident)
    }

    fn close_incident(&self, incident_id: i64, closed_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        if let Some(incident) = inner.incidents.get_mut(&incident_id) {
            incident.closed_at = Some(closed_at);
            incident.is_open = false;
        }
        Ok(())
    }

    fn increment_fail(&self, incident_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        if let Some(incident) = inner.incidents.get_mut(&incident_id) {
            incident.fail_count += 1;
        }
        Ok(())
    }

    fn ttl_cleanup(&self, older_than: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let mut removed = 0;
        for rows in inner.results.values_mut() {
            let before = rows.len();
            rows.retain(|r| r.ts >= older_than);
            removed += before - rows.len();
        }
        Ok(removed)
    }
}

impl AnalyticsView for MemoryStore {
    fn uptime_ratio(&self, id: TargetId, window: ChronoDuration, now: DateTime<Utc>) -> Option<f64> {
        let inner = self.inner.read().unwrap();
        let rows = Self::results_in_window(&inner, id, window, now);
        if rows.is_empty() {
            return None;
        }
        let ok = rows.iter().filter(|r| r.ok).count();
        Some(ok as f64 / rows.len() as f64)
    }

    fn avg_latency_ms(&self, id: TargetId, window: ChronoDuration, now: DateTime<Utc>) -> Option<f64> {
        let inner = self.inner.read().unwrap();
        let latencies: Vec<u64> = Self::results_in_window(&inner, id, window, now)
            .into_iter()
            .filter(|r| r.ok)
            .filter_map(|r| r.latency_ms)
            .collect();
        if latencies.is_empty() {
            return None;
        }
        Some(latencies.iter().sum::<u64>() as f64 / latencies.len() as f64)
    }

    fn latency_percentiles(
        &self,
        id: TargetId,
        window: ChronoDuration,
        now: DateTime<Utc>,
        percentiles: &[u8],
    ) -> HashMap<u8, Option<u64>> {
        let inner = self.inner.read().unwrap();
        let mut latencies: Vec<u64> = Self::results_in_window(&inner, id, window, now)
            .into_iter()
            .filter(|r| r.ok)
            .filter_map(|r| r.latency_ms)
            .collect();
        latencies.sort_unstable();

        percentiles
            .iter()
            .map(|&p| (p, percentile_of(&latencies, p)))
            .collect()
    }

    fn list_incidents(&self, open_only: bool) -> Vec<Incident> {
        let inner = self.inner.read().unwrap();
        let mut incidents: Vec<Incident> = inner
            .incidents
            .values()
            .filter(|inc| !open_only || inc.is_open)
            .cloned()
            .collect();
        incidents.sort_by(|a, b| b.opened_at.cmp(&a.opened_at));
        incidents
    }
}

/// Linear-interpolated percentile over an already-sorted slice, matching the
/// nearest-rank-with-interpolation formula the reporting layer used to use.
fn percentile_of(sorted: &[u64], percentile: u8) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (sorted.len() - 1) as f64 * (percentile as f64 / 100.0);
    let lower = rank.floor() as usize;
    let frac = rank - lower as f64;
    let value = if lower + 1 < sorted.len() {
        sorted[lower] as f64 + (sorted[lower + 1] as f64 - sorted[lower] as f64) * frac
    } else {
        sorted[lower] as f64
    };
    Some(value as u64)
}
