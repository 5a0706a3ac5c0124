//! Error types for webhook delivery.
//!
//! Rate limiting is not an error here: the dispatcher retries it internally.
//! Every variant below abandons the notification and stops the dispatcher,
//! so each carries enough context (destination, status, payload) for the
//! operator to diagnose the failure from the log alone.

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Fatal delivery failures.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Network-level connectivity failure (refused, reset, DNS).
    #[error("network connection to {url} failed: {message}")]
    NetworkError {
        /// Destination URL
        url: String,
        /// Error message describing the network failure
        message: String,
    },

    /// HTTP request timeout exceeded.
    #[error("request to {url} timed out after {timeout_seconds}s")]
    Timeout {
        /// Destination URL
        url: String,
        /// Number of seconds before the request timed out
        timeout_seconds: u64,
    },

    /// The sink answered with a status other than 204 or 429.
    #[error("{url} ({status_code}): POST data was: {payload}")]
    Rejected {
        /// Destination URL
        url: String,
        /// HTTP status code
        status_code: u16,
        /// Response body content
        response_body: String,
        /// Request body that was rejected
        payload: String,
    },

    /// The configured cap on rate-limit retries was reached.
    #[error("{url}: still rate limited after {attempts} attempts")]
    RetriesExhausted {
        /// Destination URL
        url: String,
        /// Number of delivery attempts made
        attempts: u32,
    },

    /// Invalid client or destination configuration.
    #[error("invalid delivery configuration: {message}")]
    ConfigurationError {
        /// Configuration error message
        message: String,
    },
}

impl DeliveryError {
    /// Creates a network error.
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NetworkError { url: url.into(), message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>, timeout_seconds: u64) -> Self {
        Self::Timeout { url: url.into(), timeout_seconds }
    }

    /// Creates a rejection error from an HTTP response.
    pub fn rejected(
        url: impl Into<String>,
        status_code: u16,
        response_body: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self::Rejected {
            url: url.into(),
            status_code,
            response_body: response_body.into(),
            payload: payload.into(),
        }
    }

    /// Creates a retries exhausted error.
    pub fn retries_exhausted(url: impl Into<String>, attempts: u32) -> Self {
        Self::RetriesExhausted { url: url.into(), attempts }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// HTTP status code returned by the sink, if it answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Rejected { status_code, .. } => Some(*status_code),
            Self::RetriesExhausted { .. } => Some(429),
            _ => None,
        }
    }

    /// Destination URL the failure relates to, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::NetworkError { url, .. }
            | Self::Timeout { url, .. }
            | Self::Rejected { url, .. }
            | Self::RetriesExhausted { url, .. } => Some(url),
            Self::ConfigurationError { .. } => None,
        }
    }
}
