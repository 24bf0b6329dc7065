//! HTTP prober (§4.1): executes a single probe with timeouts, retries and
//! best-effort phase timing.

use crate::config::{RetryConfig, TlsConfig};
use crate::error::ProbeError;
use crate::model::{truncate_error_text, CheckResult, TargetId};
use chrono::Utc;
use pingtower_core::events::EventListeners;
use pingtower_retry::{retry, AttemptOutcome, RetryEvent, RetryPolicy};
use std::cell::Cell;
use std::time::{Duration, Instant};

/// Default cap on the connect phase, overridable per prober instance (§4.1).
const DEFAULT_CONNECT_TIMEOUT_S: u64 = 3;

/// Executes HTTP probes, owning the shared `reqwest` client and its
/// connection pool (§5 "HTTP client/session").
pub struct Prober {
    verifying_client: reqwest::Client,
    insecure_client: reqwest::Client,
    retry_config: RetryConfig,
    tls: TlsConfig,
    connect_timeout: Duration,
    retry_events: EventListeners<RetryEvent>,
}

impl Prober {
    /// Builds a prober, falling back to default TLS verification if a
    /// configured CA bundle cannot be loaded (§4.1 "never silently disable").
    pub fn new(retry_config: RetryConfig, tls: TlsConfig, user_agent: &str) -> Self {
        let mut verifying_builder = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .redirect(reqwest::redirect::Policy::limited(10));

        if let (true, Some(path)) = (tls.verify, tls.ca_bundle.as_deref()) {
            match std::fs::read(path).and_then(|bytes| {
                reqwest::Certificate::from_pem(&bytes)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            }) {
                Ok(cert) => {
                    verifying_builder = verifying_builder.add_root_certificate(cert);
                }
                Err(err) => {
                    tracing::warn!(path, %err, "failed to load HTTP_CA_BUNDLE, falling back to default TLS verification");
                }
            }
        }
        if !tls.verify {
            verifying_builder = verifying_builder.danger_accept_invalid_certs(true);
        }

        let insecure_client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .redirect(reqwest::redirect::Policy::limited(10))
            .danger_accept_invalid_certs(true)
            .build()
            .expect("reqwest client with bad TLS config");

        Self {
            verifying_client: verifying_builder.build().expect("reqwest client"),
            insecure_client,
            retry_config,
            tls,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_S),
            retry_events: EventListeners::new(),
        }
    }

    /// Probes `url` with a total budget of `timeout_s` seconds (§4.1),
    /// classifying the outcome and driving the retry loop.
    pub async fn probe(&self, target_id: TargetId, url: &str, timeout_s: u64) -> CheckResult {
        let connect = self.connect_timeout.min(Duration::from_secs(timeout_s.max(1)));
        let read = Duration::from_secs(timeout_s.saturating_sub(connect.as_secs()).max(1));
        let total_timeout = connect + read;

        let policy = RetryPolicy::new(
            self.retry_config.max_attempts,
            self.retry_config.base_backoff_ms,
            self.retry_config.jitter_ms,
        );

        let started = Instant::now();
        // Set only once an insecure retry is actually issued (inside
        // `attempt_once`'s TLS-error branch), not on every attempt: the
        // budget is "one insecure retry per probe", keyed off the first SSL
        // error encountered, not off attempt index 0 (§4.1, §9a).
        let insecure_retry_used = Cell::new(false);

        let classified = retry(url, &policy, &self.retry_events, |_attempt| {
            let insecure_retry_used = &insecure_retry_used;
            async move { self.attempt_once(url, total_timeout, insecure_retry_used).await }
        })
        .await;

        let latency_ms = started.elapsed().as_millis() as u64;
        classified.into_result(target_id, latency_ms)
    }

    async fn attempt_once(
        &self,
        url: &str,
        total_timeout: Duration,
        insecure_retry_used: &Cell<bool>,
    ) -> AttemptOutcome<ClassifiedAttempt> {
        // `reqwest` does not expose DNS/connect/TLS sub-phase instants the
        // way `aiohttp.TraceConfig` does, so `connect_ms` approximates all
        // three as the time until `send()` resolves (headers received);
        // `dns_ms`/`tls_ms` stay absent rather than being reported as zero.
        let phase_start = Instant::now();
        let request = tokio::time::timeout(total_timeout, self.verifying_client.get(url).send()).await;

        match request {
            Ok(Ok(response)) => {
                let connect_ms = phase_start.elapsed().as_millis() as u64;
                Self::classify_response(response, connect_ms).await
            }
            Ok(Err(err)) if Self::is_tls_error(&err) => {
                if !insecure_retry_used.get() && self.tls.insecure_retry && self.tls.verify {
                    insecure_retry_used.set(true);
                    let retry_start = Instant::now();
                    let retry_request =
                        tokio::time::timeout(total_timeout, self.insecure_client.get(url).send()).await;
                    match retry_request {
                        Ok(Ok(response)) => {
                            let connect_ms = retry_start.elapsed().as_millis() as u64;
                            Self::classify_response(response, connect_ms).await
                        }
                        _ => AttemptOutcome::Done(ClassifiedAttempt::err(ProbeError::Tls(
                            "certificate verification failed".to_string(),
                        ))),
                    }
                } else {
                    AttemptOutcome::Done(ClassifiedAttempt::err(ProbeError::Tls(
                        "certificate verification failed".to_string(),
                    )))
                }
            }
            Ok(Err(err)) => {
                AttemptOutcome::Retryable(ClassifiedAttempt::err(ProbeError::Transport(err.to_string())))
            }
            Err(_elapsed) => AttemptOutcome::Retryable(ClassifiedAttempt::err(ProbeError::Timeout)),
        }
    }

    /// Reads the body as a stream to capture `ttfb_ms` (time from headers to
    /// first body chunk) separately from the full-body read time.
    async fn classify_response(response: reqwest::Response, connect_ms: u64) -> AttemptOutcome<ClassifiedAttempt> {
        use futures::StreamExt;

        let status = response.status().as_u16();
        let ttfb_start = Instant::now();
        let mut ttfb_ms = None;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if chunk.is_err() {
                break;
            }
            ttfb_ms.get_or_insert_with(|| ttfb_start.elapsed().as_millis() as u64);
        }

        if (200..400).contains(&status) {
            AttemptOutcome::Done(ClassifiedAttempt::ok(status, connect_ms, ttfb_ms))
        } else if (400..500).contains(&status) {
            AttemptOutcome::Done(ClassifiedAttempt::http_failure(status, connect_ms, ttfb_ms))
        } else {
            AttemptOutcome::Retryable(ClassifiedAttempt::http_failure(status, connect_ms, ttfb_ms))
        }
    }

    fn is_tls_error(err: &reqwest::Error) -> bool {
        err.is_connect()
            && err
                .source()
                .map(|s| s.to_string().to_lowercase().contains("certificate") || s.to_string().to_lowercase().contains("tls"))
                .unwrap_or(false)
    }
}

use std::error::Error as _;

/// The classified result of one HTTP attempt, before it is turned into a
/// [`CheckResult`] (which also needs `target_id` and total `latency_ms`).
struct ClassifiedAttempt {
    ok: bool,
    status_code: Option<u16>,
    error: Option<ProbeError>,
    connect_ms: Option<u64>,
    ttfb_ms: Option<u64>,
}

impl ClassifiedAttempt {
    fn ok(status: u16, connect_ms: u64, ttfb_ms: Option<u64>) -> Self {
        Self {
            ok: true,
            status_code: Some(status),
            error: None,
            connect_ms: Some(connect_ms),
            ttfb_ms,
        }
    }

    fn http_failure(status: u16, connect_ms: u64, ttfb_ms: Option<u64>) -> Self {
        Self {
            ok: false,
            status_code: Some(status),
            error: None,
            connect_ms: Some(connect_ms),
            ttfb_ms,
        }
    }

    fn err(error: ProbeError) -> Self {
        Self {
            ok: false,
            status_code: None,
            error: Some(error),
            connect_ms: None,
            ttfb_ms: None,
        }
    }

    fn into_result(self, target_id: TargetId, latency_ms: u64) -> CheckResult {
        let error_text = self.error.map(|e| e.to_string()).unwrap_or_default();
        CheckResult {
            target_id,
            ts: Utc::now(),
            ok: self.ok,
            status_code: self.status_code,
            latency_ms: Some(latency_ms),
            error_text: truncate_error_text(&error_text),
            dns_ms: None,
            connect_ms: self.connect_ms,
            tls_ms: None,
            ttfb_ms: self.ttfb_ms,
        }
    }
}
