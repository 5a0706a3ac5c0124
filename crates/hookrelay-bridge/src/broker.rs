//! Broker capability consumed by the bridge.
//!
//! Adapters push inbound traffic onto a bounded channel instead of invoking
//! callbacks, so a full delivery queue slows the adapter's event loop down
//! rather than piling messages up in memory.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

/// Capacity of the channel between a broker adapter and the router.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// MQTT delivery guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QoS {
    /// Fire and forget.
    AtMostOnce,
    /// Acknowledged delivery, duplicates possible.
    AtLeastOnce,
    /// Exactly once.
    ExactlyOnce,
}

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic the message was published to.
    pub topic: String,
    /// Raw payload.
    pub payload: Bytes,
}

impl InboundMessage {
    /// Creates an inbound message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self { topic: topic.into(), payload: payload.into() }
    }
}

/// Events produced by a broker adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// A message arrived on a subscribed topic.
    Message(InboundMessage),
    /// The connection dropped; no further messages will arrive.
    ConnectionLost(String),
}

/// Receiving half of an adapter's event channel.
pub type BrokerEvents = mpsc::Receiver<BrokerEvent>;

/// Operations the bridge needs from a broker connection.
#[async_trait::async_trait]
pub trait Broker: Send + Sync + std::fmt::Debug {
    /// Subscribes to a topic filter.
    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<()>;

    /// Publishes a message.
    async fn publish(&self, topic: &str, qos: QoS, retain: bool, payload: Bytes) -> Result<()>;

    /// Disconnects, allowing up to `grace` for in-flight work to settle.
    async fn disconnect(&self, grace: Duration) -> Result<()>;
}

/// Retained status payload published once the bridge is running.
pub const STATUS_ONLINE: &str = "online";

/// Retained status payload published on shutdown and registered as last will.
pub const STATUS_OFFLINE: &str = "offline";
