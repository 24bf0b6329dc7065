//! Top-level error type (§7.1). Every lower layer returns its own narrow
//! error type; only `main` needs to unify them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("channel '{channel}' failed: {detail}")]
    ChannelFailed { channel: String, detail: String },
}

/// A single probe attempt's failure, classified by the prober before it is
/// turned into a [`crate::model::CheckResult`] (§7.1).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("timed out waiting for a response")]
    Timeout,
    #[error("TLS verification failed: {0}")]
    Tls(String),
    #[error("connection error: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
}
