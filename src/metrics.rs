//! Metric descriptions and recording helpers (§6), following the same
//! `Once`-guarded `describe_*!` pattern as
//! [`pingtower_gates::gate`](../../crates/pingtower-gates/src/gate.rs).
//! A no-op when the `metrics` feature is disabled.

#[cfg(feature = "metrics")]
pub const LATENCY_BUCKETS: &[f64] = &[
    50.0, 100.0, 200.0, 300.0, 500.0, 750.0, 1000.0, 1500.0, 2000.0, 3000.0, 5000.0, 10000.0,
];

#[cfg(feature = "metrics")]
pub fn describe() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        describe_counter!(
            "pingtower_checks_total",
            "Total probes executed, labeled by target_id, outcome and status_code"
        );
        describe_histogram!(
            "pingtower_latency_ms",
            "Probe latency in milliseconds, labeled by target_id"
        );
        describe_gauge!(
            "pingtower_manual_queue_size",
            "Number of manual-priority probes waiting to be drained"
        );
        describe_gauge!(
            "pingtower_incidents_open",
            "Number of targets currently in an open incident"
        );
    });
}

#[cfg(not(feature = "metrics"))]
pub fn describe() {}

/// Records the outcome of a completed probe (§6 `pingtower_checks_total`,
/// `pingtower_latency_ms`).
#[cfg(feature = "metrics")]
pub fn record_check(target_id: i64, ok: bool, status_code: Option<u16>, latency_ms: Option<u64>) {
    use metrics::{counter, histogram};

    let outcome = if ok { "success" } else { "failure" };
    let status_label = status_code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string());

    counter!(
        "pingtower_checks_total",
        "target_id" => target_id.to_string(),
        "outcome" => outcome,
        "status_code" => status_label,
    )
    .increment(1);

    if let Some(latency) = latency_ms {
        histogram!("pingtower_latency_ms", "target_id" => target_id.to_string()).record(latency as f64);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_check(_target_id: i64, _ok: bool, _status_code: Option<u16>, _latency_ms: Option<u64>) {}

/// Sets the manual-queue depth gauge (§6, mirrors the original
/// `set_manual_queue_size` hook the scheduler calls after each drain).
#[cfg(feature = "metrics")]
pub fn set_manual_queue_size(size: usize) {
    metrics::gauge!("pingtower_manual_queue_size").set(size as f64);
}

#[cfg(not(feature = "metrics"))]
pub fn set_manual_queue_size(_size: usize) {}

/// Sets the open-incident count gauge (§6, ADDED).
#[cfg(feature = "metrics")]
pub fn set_incidents_open(count: usize) {
    metrics::gauge!("pingtower_incidents_open").set(count as f64);
}

#[cfg(not(feature = "metrics"))]
pub fn set_incidents_open(_count: usize) {}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;

    #[test]
    fn bucket_list_is_ascending() {
        assert!(LATENCY_BUCKETS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn describe_is_idempotent() {
        describe();
        describe();
    }
}
