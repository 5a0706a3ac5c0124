//! Error types for the bridge runtime.

use std::time::Duration;

use hookrelay_core::ConfigError;
use hookrelay_delivery::DeliveryError;
use thiserror::Error;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Fatal bridge failures.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The broker refused or could not be reached at startup.
    #[error("failed to connect to broker at {address}: {message}")]
    BrokerConnect {
        /// Broker address as configured
        address: String,
        /// Underlying failure
        message: String,
    },

    /// The broker connection dropped after startup.
    #[error("broker connection lost: {reason}")]
    ConnectionLost {
        /// Reason reported by the adapter
        reason: String,
    },

    /// A broker operation (subscribe, publish, disconnect) failed.
    #[error("broker {operation} failed: {message}")]
    Broker {
        /// Operation that failed
        operation: &'static str,
        /// Underlying failure
        message: String,
    },

    /// A notification could not be delivered.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// The delivery queue was closed while the router still had messages.
    #[error("delivery queue closed while routing {topic}")]
    QueueClosed {
        /// Topic of the message that could not be enqueued
        topic: String,
    },

    /// Draining did not finish before the deadline.
    #[error("shutdown drain did not complete within {}s", timeout.as_secs_f64())]
    DrainTimeout {
        /// Configured drain deadline
        timeout: Duration,
    },

    /// A background task panicked or was cancelled.
    #[error("{task} task failed: {message}")]
    TaskFailed {
        /// Task name
        task: &'static str,
        /// Join error description
        message: String,
    },

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BridgeError {
    /// Creates a broker connect error.
    pub fn broker_connect(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BrokerConnect { address: address.into(), message: message.into() }
    }

    /// Creates a connection lost error.
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self::ConnectionLost { reason: reason.into() }
    }

    /// Creates a broker operation error.
    pub fn broker(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Broker { operation, message: message.into() }
    }

    /// Creates a task failure error.
    pub fn task_failed(task: &'static str, message: impl Into<String>) -> Self {
        Self::TaskFailed { task, message: message.into() }
    }
}
