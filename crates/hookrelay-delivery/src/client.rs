//! HTTP client for posting notifications to chat webhooks.
//!
//! Only transport failures are errors here. Every HTTP response, including
//! 4xx/5xx and 429, comes back as a `DeliveryResponse` so the dispatcher can
//! apply the rate-limit protocol.

use std::{collections::HashMap, time::Duration};

use hookrelay_core::{models::redact_url, DeliverySettings, QueuedNotification};
use reqwest::{header::HeaderMap, Response};
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};

use crate::error::{DeliveryError, Result};

/// Configuration for the webhook delivery client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Timeout for a single HTTP request.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from(&DeliverySettings::default())
    }
}

impl From<&DeliverySettings> for ClientConfig {
    fn from(settings: &DeliverySettings) -> Self {
        Self { timeout: settings.request_timeout(), user_agent: settings.user_agent.clone() }
    }
}

/// HTTP client used by the dispatcher.
///
/// Wraps one pooled `reqwest::Client`; created once and reused for every
/// notification.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    config: ClientConfig,
}

/// Response from a webhook delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers, names lowercased.
    pub headers: HashMap<String, String>,
    /// Response body (limited size).
    pub body: String,
    /// Total duration of the request.
    pub duration: Duration,
}

impl DeliveryResponse {
    /// The sink accepted the message.
    pub fn is_delivered(&self) -> bool {
        self.status_code == 204
    }

    /// The sink asked us to slow down.
    pub fn is_rate_limited(&self) -> bool {
        self.status_code == 429
    }
}

impl DeliveryClient {
    /// Creates a new delivery client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be built from the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a new delivery client with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Posts one notification body as JSON.
    ///
    /// # Errors
    ///
    /// - `Timeout` when the request exceeds the configured timeout
    /// - `NetworkError` for connection and other transport failures
    pub async fn deliver(&self, notification: &QueuedNotification) -> Result<DeliveryResponse> {
        let start_time = std::time::Instant::now();
        let url = notification.destination_url.as_str();

        let span = info_span!(
            "webhook_post",
            notification_id = %notification.id,
            url = %redact_url(url),
        );

        async move {
            tracing::debug!(bytes = notification.body.len(), "posting notification");

            let response = match self
                .client
                .post(url)
                .header("content-type", "application/json")
                .body(notification.body.clone())
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    let duration = start_time.elapsed();
                    tracing::warn!(duration_ms = duration.as_millis(), "request failed: {}", e);

                    if e.is_timeout() {
                        return Err(DeliveryError::timeout(url, self.config.timeout.as_secs()));
                    }
                    if e.is_connect() {
                        return Err(DeliveryError::network(url, format!("connection failed: {e}")));
                    }
                    return Err(DeliveryError::network(url, e.to_string()));
                },
            };

            let duration = start_time.elapsed();
            let delivery_response = parse_response(response, duration).await;

            tracing::debug!(
                status = delivery_response.status_code,
                duration_ms = duration.as_millis(),
                "received response"
            );

            Ok(delivery_response)
        }
        .instrument(span)
        .await
    }
}

/// Reads status, headers and a size-capped body from the response.
async fn parse_response(response: Response, duration: Duration) -> DeliveryResponse {
    const MAX_RESPONSE_BODY_SIZE: usize = 64 * 1024;
    const MAX_LOGGED_SIZE: usize = 1024;

    let status_code = response.status().as_u16();
    let headers = extract_headers(response.headers());

    let body = match response.bytes().await {
        Ok(bytes) if bytes.len() > MAX_RESPONSE_BODY_SIZE => {
            let suffix = "... (truncated)";
            let truncated = String::from_utf8_lossy(&bytes[..MAX_LOGGED_SIZE - suffix.len()]);
            format!("{truncated}{suffix}")
        },
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::warn!("failed to read response body: {}", e);
            format!("[failed to read response body: {e}]")
        },
    };

    DeliveryResponse { status_code, headers, body, duration }
}

/// Extracts headers from reqwest HeaderMap into a standard HashMap.
fn extract_headers(header_map: &HeaderMap) -> HashMap<String, String> {
    let mut headers = HashMap::new();

    for (key, value) in header_map {
        if let Ok(value_str) = value.to_str() {
            headers.insert(key.as_str().to_ascii_lowercase(), value_str.to_string());
        }
    }

    headers
}
