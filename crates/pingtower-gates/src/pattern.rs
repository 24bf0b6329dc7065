//! Per-target gate selection driven by `SERVICE_LIMITS_JSON`.

use crate::gate::Gate;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;

/// One parsed `SERVICE_LIMITS_JSON` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLimitRule {
    pub pattern: String,
    #[serde(default)]
    pub concurrency: usize,
    #[serde(default)]
    pub rps: f64,
}

struct CompiledRule {
    pattern: Regex,
    concurrency: usize,
    rps: f64,
    gate: Option<Gate>,
}

/// Parses `SERVICE_LIMITS_JSON`. Malformed input (bad JSON or an invalid
/// regex pattern) is never fatal: it is reported to the caller as `None` so
/// the caller can log a warning and fall back to an empty rule set, matching
/// the source's "invalid config is logged and treated as empty" policy.
pub fn parse_service_limits(json: &str) -> Option<Vec<RawLimitRule>> {
    if json.trim().is_empty() {
        return Some(Vec::new());
    }
    serde_json::from_str(json).ok()
}

/// Nested admission control: a global gate, an optional global RPS stagger,
/// and the first-match-wins list of per-pattern gates (§4.2).
pub struct GateSet {
    global: Gate,
    global_rps: Option<f64>,
    rules: Vec<CompiledRule>,
}

impl GateSet {
    /// Builds a gate set from the global concurrency/RPS knobs and the
    /// parsed `SERVICE_LIMITS_JSON` rules. Rules with an unparsable regex
    /// are skipped (and would be logged by the caller).
    pub fn new(global_concurrency: usize, global_rps: Option<f64>, raw_rules: Vec<RawLimitRule>) -> Self {
        let rules = raw_rules
            .into_iter()
            .filter_map(|raw| {
                let pattern = Regex::new(&raw.pattern).ok()?;
                let gate = if raw.concurrency > 0 {
                    Some(
                        Gate::builder()
                            .name(format!("pattern:{}", raw.pattern))
                            .max_permits(raw.concurrency)
                            .build(),
                    )
                } else {
                    None
                };
                Some(CompiledRule {
                    pattern,
                    concurrency: raw.concurrency,
                    rps: raw.rps,
                    gate,
                })
            })
            .collect();

        Self {
            global: Gate::global(global_concurrency),
            global_rps,
            rules,
        }
    }

    fn matching_rule(&self, url: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|rule| rule.pattern.is_match(url))
    }

    /// Returns the gate a probe of `url` must acquire.
    pub fn gate_for(&self, url: &str) -> Gate {
        match self.matching_rule(url).and_then(|rule| rule.gate.clone()) {
            Some(gate) => gate,
            None => self.global.clone(),
        }
    }

    /// Returns the initial dispatch delay for the `index`-th (0-based) due
    /// target in this tick, combining the global RPS stagger with any
    /// per-pattern RPS override: `max(global_delay, 1 / per_rps)`.
    pub fn initial_delay(&self, url: &str, index: usize) -> Duration {
        let global_delay = match self.global_rps {
            Some(rps) if rps > 0.0 => pingtower_core::clock::rate_stagger_delay(index, rps),
            _ => Duration::ZERO,
        };

        match self.matching_rule(url) {
            Some(rule) if rule.rps > 0.0 => {
                let per_rule_delay = Duration::from_secs_f64(1.0 / rule.rps);
                global_delay.max(per_rule_delay)
            }
            _ => global_delay,
        }
    }

    /// The global gate, exposed so the scheduler can read `in_use()` for the
    /// concurrency invariant test in §8.
    pub fn global_gate(&self) -> &Gate {
        &self.global
    }
}

impl Clone for CompiledRule {
    fn clone(&self) -> Self {
        Self {
            pattern: self.pattern.clone(),
            concurrency: self.concurrency,
            rps: self.rps,
            gate: self.gate.clone(),
        }
    }
}
