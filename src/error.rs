//! Error types shared across the crate.

use thiserror::Error;

/// Error returned when building a [`Notifier`](crate::Notifier) fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// The throttle interval must be non-zero.
    #[error("interval must be greater than 0")]
    ZeroInterval,
    /// The throttle threshold must be at least one.
    #[error("threshold must be greater than 0")]
    ZeroThreshold,
    /// The aggregation tick period must be non-zero.
    #[error("aggregation_interval must be greater than 0")]
    ZeroAggregationInterval,
    /// The signature registry cap must be at least one.
    #[error("max_signatures must be greater than 0")]
    ZeroMaxSignatures,
    /// At least one delivery worker is required.
    #[error("workers must be greater than 0")]
    ZeroWorkers,
    /// The delivery queue must hold at least one task.
    #[error("queue_capacity must be greater than 0")]
    ZeroQueueCapacity,
    /// Delivery workers need a tokio runtime to run on.
    #[error("no tokio runtime available; build the notifier from within a runtime or pass a handle")]
    NoRuntime,
}

/// Error returned when loading a [`NoticeConfig`](crate::NoticeConfig) fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration sources could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    /// The configuration was read but holds invalid values.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] BuildError),
}

/// Error returned by a [`Renderer`](crate::Renderer).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The event lacks a field the renderer needs.
    #[error("event is missing required field `{0}`")]
    MissingField(String),
    /// Any other rendering failure.
    #[error("failed to render notice: {0}")]
    Failed(String),
}

/// Error returned by a channel when delivery fails outright.
///
/// A channel that reached its backend but was refused reports `Ok(false)`
/// instead; this type covers failures to talk to the backend at all.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The transport could not complete the request.
    #[error("transport error: {0}")]
    Transport(String),
    /// A payload or response could not be encoded or decoded.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    /// The backend answered with something unusable.
    #[error("unexpected response: {0}")]
    Response(String),
}

/// Error returned when a background task fails to shut down cleanly.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The task panicked before it could stop.
    #[error("background task panicked")]
    Panicked,
    /// The task was cancelled before it could stop.
    #[error("background task was cancelled")]
    Cancelled,
}

impl From<tokio::task::JoinError> for ShutdownError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            ShutdownError::Panicked
        } else {
            ShutdownError::Cancelled
        }
    }
}
