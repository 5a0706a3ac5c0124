//! Bridge configuration.
//!
//! Configuration is loaded in priority order:
//! 1. Environment variables prefixed with `HOOKRELAY_` (highest priority)
//! 2. The JSON configuration file
//! 3. Built-in defaults (lowest priority)
//!
//! Nested keys are addressed with a double underscore, e.g.
//! `HOOKRELAY_MQTT_SERVER__ADDRESS` or `HOOKRELAY_DELIVERY__QUEUE_CAPACITY`.
//! The loaded value is immutable and passed explicitly to every component.

use std::{path::Path, time::Duration};

use figment::{
    providers::{Env, Format, Json},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result},
    models::Subscription,
    topic,
};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "hookrelay.json";

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "HOOKRELAY_";

/// Default MQTT port used when the broker address omits one.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Complete bridge configuration.
///
/// # Example
///
/// ```no_run
/// use hookrelay_core::BridgeConfig;
///
/// let config = BridgeConfig::load("hookrelay.json").expect("failed to load configuration");
/// println!("bridging {} subscriptions", config.subscriptions.len());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Broker connection and lifecycle notification settings.
    #[serde(default)]
    pub mqtt_server: ServerConfig,

    /// Topic to webhook bindings.
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,

    /// Delivery pipeline tuning.
    #[serde(default)]
    pub delivery: DeliverySettings,
}

/// Broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Broker address, e.g. `tcp://localhost:1883`.
    #[serde(default)]
    pub address: String,

    /// Optional broker username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Optional broker password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// MQTT client identifier.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Prefix prepended to every subscription topic and the status topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_prefix: Option<String>,

    /// Topic receiving retained `online`/`offline` status messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_topic: Option<String>,

    /// Webhook receiving lifecycle notifications.
    #[serde(default)]
    pub meta_webhook: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            username: None,
            password: None,
            client_id: default_client_id(),
            topic_prefix: None,
            status_topic: None,
            meta_webhook: String::new(),
        }
    }
}

impl ServerConfig {
    /// Applies the configured topic prefix to `topic`.
    pub fn prefixed(&self, topic: &str) -> String {
        match &self.topic_prefix {
            Some(prefix) => format!("{prefix}{topic}"),
            None => topic.to_string(),
        }
    }

    /// Returns the fully prefixed status topic, if one is configured.
    pub fn status_topic(&self) -> Option<String> {
        self.status_topic.as_deref().map(|topic| self.prefixed(topic))
    }

    /// Splits the broker address into host and port.
    ///
    /// Accepts `tcp://`, `mqtt://` or scheme-less `host[:port]` addresses.
    pub fn broker_endpoint(&self) -> Result<(String, u16)> {
        let with_scheme = if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("tcp://{}", self.address)
        };

        let url = url::Url::parse(&with_scheme)
            .map_err(|e| ConfigError::invalid_url("mqtt_server.address", e.to_string()))?;

        if !matches!(url.scheme(), "tcp" | "mqtt") {
            return Err(ConfigError::invalid_url(
                "mqtt_server.address",
                format!("unsupported scheme '{}', expected tcp or mqtt", url.scheme()),
            ));
        }

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ConfigError::invalid_url("mqtt_server.address", "missing host"))?;

        Ok((host.to_string(), url.port().unwrap_or(DEFAULT_MQTT_PORT)))
    }
}

/// Delivery pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverySettings {
    /// Capacity of the delivery queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Timeout for a single webhook request in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Deadline for draining the queue during shutdown in seconds.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_seconds: u64,

    /// Cap on rate-limit retries per notification. Unlimited when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rate_limit_retries: Option<u32>,

    /// User agent sent with webhook requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            request_timeout_seconds: default_request_timeout(),
            drain_timeout_seconds: default_drain_timeout(),
            max_rate_limit_retries: None,
            user_agent: default_user_agent(),
        }
    }
}

impl DeliverySettings {
    /// Request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Drain deadline as a `Duration`.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_seconds)
    }
}

impl BridgeConfig {
    /// Loads configuration from `path` with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, cannot be parsed, or
    /// fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::MissingFile { path: path.display().to_string() });
        }

        Self::from_figment(
            Figment::new().merge(Json::file(path)).merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    /// Extracts and validates configuration from an arbitrary figment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if extraction or validation fails.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<()> {
        if self.mqtt_server.address.trim().is_empty() {
            return Err(ConfigError::invalid("mqtt_server.address must not be empty"));
        }
        self.mqtt_server.broker_endpoint()?;

        if self.mqtt_server.client_id.is_empty() {
            return Err(ConfigError::invalid("mqtt_server.client_id must not be empty"));
        }

        validate_webhook_url("mqtt_server.meta_webhook", &self.mqtt_server.meta_webhook)?;

        if let Some(status_topic) = self.mqtt_server.status_topic() {
            if status_topic.contains(['+', '#']) || status_topic.is_empty() {
                return Err(ConfigError::invalid(
                    "mqtt_server.status_topic must be a non-empty topic without wildcards",
                ));
            }
        }

        if self.subscriptions.is_empty() {
            return Err(ConfigError::invalid("at least one subscription is required"));
        }

        for (index, subscription) in self.subscriptions.iter().enumerate() {
            let filter = self.mqtt_server.prefixed(&subscription.topic);
            if subscription.topic.is_empty() || !topic::is_valid_filter(&filter) {
                return Err(ConfigError::invalid(format!(
                    "subscriptions[{index}].topic '{filter}' is not a valid MQTT topic filter"
                )));
            }
            validate_webhook_url(
                &format!("subscriptions[{index}].webhook"),
                &subscription.destination_url,
            )?;
        }

        if self.delivery.queue_capacity == 0 {
            return Err(ConfigError::invalid("delivery.queue_capacity must be greater than 0"));
        }

        if self.delivery.request_timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "delivery.request_timeout_seconds must be greater than 0",
            ));
        }

        if self.delivery.drain_timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "delivery.drain_timeout_seconds must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn validate_webhook_url(field: &str, raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(ConfigError::invalid(format!("{field} must not be empty")));
    }

    let url = url::Url::parse(raw).map_err(|e| ConfigError::invalid_url(field, e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid_url(
            field,
            format!("unsupported scheme '{}', expected http or https", url.scheme()),
        ));
    }

    Ok(())
}

fn default_client_id() -> String {
    "hookrelay".to_string()
}

fn default_queue_capacity() -> usize {
    64
}

fn default_request_timeout() -> u64 {
    30
}

fn default_drain_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("hookrelay/", env!("CARGO_PKG_VERSION")).to_string()
}
