//! Core data model (§3): targets, probe results, and incidents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier for a [`Target`].
pub type TargetId = i64;

/// A monitored URL and its probe cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub name: String,
    pub url: String,
    /// Desired period between probes, in seconds. Must be `>= 60`.
    pub interval_s: u64,
    /// Per-probe timeout budget, in seconds. Must be `>= 1`.
    pub timeout_s: u64,
    pub created_at: DateTime<Utc>,
}

impl Target {
    /// `interval_s = 60, timeout_s = 1` is the minimal valid configuration (§8).
    pub fn is_valid(&self) -> bool {
        self.interval_s >= 60 && self.timeout_s >= 1
    }
}

/// The outcome of a single probe, including any internal retries (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub target_id: TargetId,
    pub ts: DateTime<Utc>,
    /// True iff the probe completed and the final HTTP status was `[200, 400)`.
    pub ok: bool,
    pub status_code: Option<u16>,
    /// Elapsed wall time from probe-slot acquisition to completion or failure.
    pub latency_ms: Option<u64>,
    /// Bounded to 512 bytes; empty on success.
    pub error_text: String,
    pub dns_ms: Option<u64>,
    pub connect_ms: Option<u64>,
    pub tls_ms: Option<u64>,
    pub ttfb_ms: Option<u64>,
}

/// Maximum byte length of [`CheckResult::error_text`] (§3).
pub const ERROR_TEXT_MAX_BYTES: usize = 512;

/// Truncates `text` to [`ERROR_TEXT_MAX_BYTES`] on a UTF-8 boundary.
pub fn truncate_error_text(text: &str) -> String {
    if text.len() <= ERROR_TEXT_MAX_BYTES {
        return text.to_string();
    }
    let mut end = ERROR_TEXT_MAX_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// A period during which a target is considered down (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub target_id: TargetId,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub fail_count: u32,
    pub is_open: bool,
}

impl Incident {
    /// Invariant: `is_open ⇔ closed_at is absent` (§3, §8).
    pub fn invariants_hold(&self) -> bool {
        let open_consistent = self.is_open == self.closed_at.is_none();
        let ordering_consistent = match self.closed_at {
            Some(closed_at) => closed_at >= self.opened_at,
            None => true,
        };
        open_consistent && ordering_consistent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_valid_target() {
        let target = Target {
            id: 1,
            name: "min".into(),
            url: "https://example.com".into(),
            interval_s: 60,
            timeout_s: 1,
            created_at: Utc::now(),
        };
        assert!(target.is_valid());
    }

    #[test]
    fn error_text_truncates_at_512_bytes() {
        let long = "x".repeat(1000);
        let truncated = truncate_error_text(&long);
        assert_eq!(truncated.len(), ERROR_TEXT_MAX_BYTES);
    }

    #[test]
    fn short_error_text_is_unchanged() {
        assert_eq!(truncate_error_text("Timeout"), "Timeout");
    }

    #[test]
    fn incident_invariants() {
        let now = Utc::now();
        let open = Incident {
            id: 1,
            target_id: 1,
            opened_at: now,
            closed_at: None,
            fail_count: 3,
            is_open: true,
        };
        assert!(open.invariants_hold());

        let closed = Incident {
            closed_at: Some(now),
            is_open: false,
            ..open.clone()
        };
        assert!(closed.invariants_hold());

        let inconsistent = Incident {
            is_open: true,
            ..closed
        };
        assert!(!inconsistent.invariants_hold());
    }
}
