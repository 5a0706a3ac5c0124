//! In-memory broker for exercising the bridge without an MQTT server.
//!
//! Inbound messages are only delivered when they match a filter the bridge
//! subscribed to, like a real broker. Every subscribe, publish and
//! disconnect call is recorded for assertions.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use bytes::Bytes;
use hookrelay_bridge::{
    broker::EVENT_CHANNEL_CAPACITY, Broker, BridgeError, BrokerEvent, BrokerEvents,
    InboundMessage, QoS,
};
use hookrelay_core::topic::matches_filter;
use tokio::sync::mpsc;

/// A message the bridge published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Topic published to.
    pub topic: String,
    /// Requested QoS.
    pub qos: QoS,
    /// Retain flag.
    pub retain: bool,
    /// Payload.
    pub payload: Bytes,
}

impl PublishedMessage {
    /// Payload as text.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Debug, Default)]
struct State {
    events: Option<mpsc::Sender<BrokerEvent>>,
    subscriptions: Vec<(String, QoS)>,
    published: Vec<PublishedMessage>,
    disconnected: bool,
    fail_subscribe: bool,
}

/// Broker double implementing [`Broker`].
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    state: Arc<Mutex<State>>,
}

impl InMemoryBroker {
    /// Creates a connected broker and the event channel the bridge reads.
    pub fn new() -> (Self, BrokerEvents) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let state = State { events: Some(events_tx), ..State::default() };
        (Self { state: Arc::new(Mutex::new(state)) }, events_rx)
    }

    /// Makes subsequent `subscribe` calls fail.
    pub fn fail_subscriptions(&self) {
        self.lock().fail_subscribe = true;
    }

    /// Simulates a message published by another client.
    ///
    /// Returns `false` if no subscription matched or the bridge stopped
    /// listening.
    pub async fn publish_inbound(&self, topic: &str, payload: impl Into<Bytes>) -> bool {
        let sender = {
            let state = self.lock();
            let subscribed =
                state.subscriptions.iter().any(|(filter, _)| matches_filter(filter, topic));
            match (&state.events, subscribed) {
                (Some(sender), true) => sender.clone(),
                _ => return false,
            }
        };

        sender.send(BrokerEvent::Message(InboundMessage::new(topic, payload))).await.is_ok()
    }

    /// Simulates the connection dropping.
    pub async fn drop_connection(&self, reason: &str) {
        let sender = self.lock().events.take();
        if let Some(sender) = sender {
            let _ = sender.send(BrokerEvent::ConnectionLost(reason.to_string())).await;
        }
    }

    /// Filters the bridge subscribed to, in order.
    pub fn subscriptions(&self) -> Vec<String> {
        self.lock().subscriptions.iter().map(|(filter, _)| filter.clone()).collect()
    }

    /// QoS requested for `filter`, if subscribed.
    pub fn subscription_qos(&self, filter: &str) -> Option<QoS> {
        self.lock().subscriptions.iter().find(|(f, _)| f == filter).map(|(_, qos)| *qos)
    }

    /// Messages the bridge published, in order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.lock().published.clone()
    }

    /// Returns `true` once the bridge disconnected.
    pub fn is_disconnected(&self) -> bool {
        self.lock().disconnected
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl Broker for InMemoryBroker {
    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), BridgeError> {
        let mut state = self.lock();
        if state.fail_subscribe {
            return Err(BridgeError::broker("subscribe", format!("not authorized for {filter}")));
        }
        state.subscriptions.push((filter.to_string(), qos));
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Bytes,
    ) -> Result<(), BridgeError> {
        self.lock().published.push(PublishedMessage {
            topic: topic.to_string(),
            qos,
            retain,
            payload,
        });
        Ok(())
    }

    async fn disconnect(&self, _grace: Duration) -> Result<(), BridgeError> {
        let mut state = self.lock();
        state.disconnected = true;
        state.events = None;
        Ok(())
    }
}
