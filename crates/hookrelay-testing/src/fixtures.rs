//! Configuration and notification builders with test-friendly defaults.

use chrono::Utc;
use hookrelay_core::{BridgeConfig, QueuedNotification, ServerConfig, Subscription};

/// Builder for bridge configurations pointing at mock sinks.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: BridgeConfig,
}

impl ConfigBuilder {
    /// Starts a configuration whose lifecycle notices go to `meta_webhook`.
    pub fn new(meta_webhook: impl Into<String>) -> Self {
        Self {
            config: BridgeConfig {
                mqtt_server: ServerConfig {
                    address: "tcp://localhost:1883".to_string(),
                    meta_webhook: meta_webhook.into(),
                    ..ServerConfig::default()
                },
                ..BridgeConfig::default()
            },
        }
    }

    /// Adds a subscription.
    #[must_use]
    pub fn subscription(mut self, topic: &str, webhook: impl Into<String>) -> Self {
        self.config.subscriptions.push(Subscription::new(topic, webhook));
        self
    }

    /// Sets the topic prefix.
    #[must_use]
    pub fn topic_prefix(mut self, prefix: &str) -> Self {
        self.config.mqtt_server.topic_prefix = Some(prefix.to_string());
        self
    }

    /// Sets the status topic.
    #[must_use]
    pub fn status_topic(mut self, topic: &str) -> Self {
        self.config.mqtt_server.status_topic = Some(topic.to_string());
        self
    }

    /// Sets the queue capacity.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.delivery.queue_capacity = capacity;
        self
    }

    /// Sets the drain deadline in seconds.
    #[must_use]
    pub fn drain_timeout_seconds(mut self, seconds: u64) -> Self {
        self.config.delivery.drain_timeout_seconds = seconds;
        self
    }

    /// Sets the per-request timeout in seconds.
    #[must_use]
    pub fn request_timeout_seconds(mut self, seconds: u64) -> Self {
        self.config.delivery.request_timeout_seconds = seconds;
        self
    }

    /// Caps rate-limit retries.
    #[must_use]
    pub fn max_rate_limit_retries(mut self, retries: u32) -> Self {
        self.config.delivery.max_rate_limit_retries = Some(retries);
        self
    }

    /// Finishes the configuration.
    pub fn build(self) -> BridgeConfig {
        self.config
    }
}

/// A formatted notification for `topic`/`payload` addressed to `url`.
pub fn notification(url: &str, topic: &str, payload: &str) -> QueuedNotification {
    QueuedNotification::from_event(url, topic, payload.as_bytes(), Utc::now())
}
