//! Property tests for the incident state machine.
//!
//! Invariants tested:
//! - An incident never opens on a failure streak shorter than `OPEN_THRESHOLD`.
//! - `fail_count` only ever increases while an incident stays open.
//! - Every `Escalated` transition lands on a `fail_count` that is a
//!   multiple of `ESCALATION_INTERVAL`.

use chrono::{DateTime, TimeZone, Utc};
use pingtower_incident::{IncidentState, Transition, ESCALATION_INTERVAL, OPEN_THRESHOLD};
use proptest::prelude::*;

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn never_opens_below_threshold(streak in 0u32..OPEN_THRESHOLD) {
        let mut state = IncidentState::new();
        let transition = state.evaluate(false, streak, at(0));
        prop_assert_eq!(transition, Transition::NoChange);
        prop_assert!(state.open().is_none());
    }

    #[test]
    fn fail_count_never_decreases_while_open(
        failures in 0usize..50,
        gap_seconds in 1i64..120,
    ) {
        let mut state = IncidentState::new();
        state.evaluate(false, OPEN_THRESHOLD, at(0));
        prop_assert!(state.open().is_some());

        let mut last_fail_count = state.open().unwrap().fail_count;
        for i in 0..failures {
            let now = at(1 + gap_seconds * i as i64);
            let transition = state.evaluate(false, OPEN_THRESHOLD + 1 + i as u32, now);
            let fail_count = match transition {
                Transition::FailureRecorded { fail_count } | Transition::Escalated { fail_count } => fail_count,
                other => panic!("unexpected transition while open: {other:?}"),
            };
            prop_assert!(fail_count > last_fail_count);
            last_fail_count = fail_count;
        }
    }

    #[test]
    fn escalations_only_land_on_interval_multiples(
        failures in (OPEN_THRESHOLD as usize)..60,
    ) {
        let mut state = IncidentState::new();
        for n in 1..=failures as u32 {
            let transition = state.evaluate(false, n.min(OPEN_THRESHOLD), at(n as i64 * 301));
            if let Transition::Escalated { fail_count } = transition {
                prop_assert_eq!(fail_count % ESCALATION_INTERVAL, 0);
            }
        }
    }

    #[test]
    fn success_always_closes_and_resets(streak in OPEN_THRESHOLD..30u32) {
        let mut state = IncidentState::new();
        state.evaluate(false, streak, at(0));
        prop_assert!(state.open().is_some());

        let transition = state.evaluate(true, 0, at(1));
        prop_assert_eq!(transition, Transition::Closed);
        prop_assert!(state.open().is_none());
    }
}
