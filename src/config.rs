//! Startup configuration, collected from environment variables (§6, §9).

use crate::error::ConfigError;
use pingtower_gates::RawLimitRule;
use std::env;
use std::time::Duration;

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64_opt(key: &str) -> Option<f64> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => !matches!(v.to_lowercase().as_str(), "0" | "false" | "no"),
        Err(_) => default,
    }
}

/// TLS policy knobs for the prober (§4.1).
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub verify: bool,
    pub ca_bundle: Option<String>,
    pub insecure_retry: bool,
}

/// Retry policy knobs for the prober (§4.1, §6).
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub jitter_ms: u64,
}

/// Every runtime knob the service reads from the environment, collected and
/// validated once at startup (§9 "Config objects").
#[derive(Debug, Clone)]
pub struct Config {
    pub global_concurrency: usize,
    pub global_rps: Option<f64>,
    pub tick: Duration,
    pub ttl_cleanup: Duration,
    pub drain_deadline: Duration,
    pub retry: RetryConfig,
    pub tls: TlsConfig,
    pub service_limits: Vec<RawLimitRule>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub webhook_url: Option<String>,
}

impl Config {
    /// Reads and validates configuration from the process environment.
    /// Never fails on a malformed `SERVICE_LIMITS_JSON` (it is logged and
    /// treated as empty, per §7); only a tick period of zero is rejected as
    /// unrecoverable misconfiguration.
    pub fn from_env() -> Result<Self, ConfigError> {
        let tick_secs = env_u64("CHECK_TICK_SEC", 10).max(1);
        let service_limits_raw = env::var("SERVICE_LIMITS_JSON").unwrap_or_default();
        let service_limits = match pingtower_gates::parse_service_limits(&service_limits_raw) {
            Some(rules) => rules,
            None => {
                tracing::warn!(
                    raw = %service_limits_raw,
                    "SERVICE_LIMITS_JSON is malformed, falling back to no per-target limits"
                );
                Vec::new()
            }
        };

        Ok(Self {
            global_concurrency: env_u64("GLOBAL_CONCURRENCY", 10).max(1) as usize,
            global_rps: env_f64_opt("GLOBAL_RPS"),
            tick: Duration::from_secs(tick_secs),
            ttl_cleanup: Duration::from_secs(env_u64("TTL_CLEANUP_HOURS", 720) * 3600),
            drain_deadline: Duration::from_secs(env_u64("SHUTDOWN_DRAIN_SEC", 5)),
            retry: RetryConfig {
                max_attempts: env_u64("HTTP_RETRY_ATTEMPTS", 1).max(1) as u32,
                base_backoff_ms: env_u64("HTTP_RETRY_BASE_MS", 200).max(50),
                jitter_ms: env_u64("HTTP_RETRY_JITTER_MS", 100),
            },
            tls: TlsConfig {
                verify: env_bool("HTTP_SSL_VERIFY", true),
                ca_bundle: env::var("HTTP_CA_BUNDLE").ok(),
                insecure_retry: env_bool("HTTP_SSL_INSECURE_RETRY", true),
            },
            service_limits,
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_chat_id: env::var("TELEGRAM_CHAT_ID").ok(),
            webhook_url: env::var("WEBHOOK_URL").ok(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_limits_json_does_not_panic() {
        let rules = pingtower_gates::parse_service_limits("{not json");
        assert!(rules.is_none());
    }

    #[test]
    fn empty_limits_json_is_empty_ruleset() {
        let rules = pingtower_gates::parse_service_limits("").unwrap();
        assert!(rules.is_empty());
    }
}
