//! Maps broker messages to webhook notifications.
//!
//! The route table is built once from configuration and shared read-only.
//! A message is delivered to every subscription whose filter matches its
//! topic, in configuration order.

use std::sync::Arc;

use hookrelay_core::{topic::matches_filter, BridgeConfig, Clock, QueuedNotification};
use hookrelay_delivery::DeliveryQueue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    broker::{Broker, BrokerEvent, BrokerEvents, InboundMessage, QoS},
    error::{BridgeError, Result},
};

/// One topic filter and the webhook its messages go to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Fully prefixed topic filter.
    pub filter: String,
    /// Webhook URL.
    pub destination_url: String,
}

/// Immutable filter to destination table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Builds the table from configured subscriptions, applying the topic
    /// prefix.
    pub fn from_config(config: &BridgeConfig) -> Self {
        let routes = config
            .subscriptions
            .iter()
            .map(|subscription| Route {
                filter: config.mqtt_server.prefixed(&subscription.topic),
                destination_url: subscription.destination_url.clone(),
            })
            .collect();

        Self { routes }
    }

    /// Destinations whose filter matches `topic`, in table order.
    pub fn destinations_for<'a>(&'a self, topic: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.routes
            .iter()
            .filter(move |route| matches_filter(&route.filter, topic))
            .map(|route| route.destination_url.as_str())
    }

    /// Distinct filters to subscribe to, in table order.
    pub fn filters(&self) -> Vec<&str> {
        let mut filters: Vec<&str> = Vec::with_capacity(self.routes.len());
        for route in &self.routes {
            if !filters.contains(&route.filter.as_str()) {
                filters.push(&route.filter);
            }
        }
        filters
    }

    /// All routes.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if the table has no routes.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Router counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Messages received from the broker.
    pub received: u64,
    /// Notifications enqueued.
    pub enqueued: u64,
    /// Messages no route matched.
    pub unmatched: u64,
}

/// Turns broker messages into queued notifications.
#[derive(Debug, Clone)]
pub struct SubscriptionRouter {
    table: Arc<RouteTable>,
    queue: DeliveryQueue,
    clock: Arc<dyn Clock>,
}

impl SubscriptionRouter {
    /// Creates a router feeding `queue`.
    pub fn new(table: Arc<RouteTable>, queue: DeliveryQueue, clock: Arc<dyn Clock>) -> Self {
        Self { table, queue, clock }
    }

    /// Subscribes to every configured filter with at-least-once delivery.
    ///
    /// # Errors
    ///
    /// Returns the first failing subscribe call.
    pub async fn subscribe_all(&self, broker: &dyn Broker) -> Result<()> {
        for filter in self.table.filters() {
            broker.subscribe(filter, QoS::AtLeastOnce).await?;
            info!(topic = %filter, "subscribed");
        }
        Ok(())
    }

    /// Enqueues one notification per matching route.
    ///
    /// Returns how many notifications were enqueued; zero means no route
    /// matched.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::QueueClosed` if the queue was closed, which only
    /// happens after the dispatcher has stopped.
    pub async fn route(&self, message: &InboundMessage) -> Result<usize> {
        let received_at = self.clock.now_utc();
        let mut enqueued = 0;

        for destination in self.table.destinations_for(&message.topic) {
            let notification = QueuedNotification::from_event(
                destination,
                &message.topic,
                &message.payload,
                received_at,
            );
            debug!(
                notification_id = %notification.id,
                topic = %message.topic,
                "enqueueing notification"
            );

            self.queue
                .enqueue(notification)
                .await
                .map_err(|_| BridgeError::QueueClosed { topic: message.topic.clone() })?;
            enqueued += 1;
        }

        if enqueued == 0 {
            warn!(topic = %message.topic, "no subscription matches topic, ignoring message");
        }

        Ok(enqueued)
    }

    /// Routes broker events until cancelled.
    ///
    /// Cancellation is only observed between events, so a notification being
    /// enqueued when shutdown starts still makes it into the queue.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::ConnectionLost` when the broker reports a lost
    /// connection or its channel closes, and `BridgeError::QueueClosed` if
    /// the dispatcher stopped.
    pub async fn run(
        self,
        mut events: BrokerEvents,
        cancellation: CancellationToken,
    ) -> Result<RouterStats> {
        let mut stats = RouterStats::default();
        info!(routes = self.table.len(), "router started");

        loop {
            let event = tokio::select! {
                biased;
                () = cancellation.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Some(BrokerEvent::Message(message)) => {
                    stats.received += 1;
                    let enqueued = self.route(&message).await?;
                    if enqueued == 0 {
                        stats.unmatched += 1;
                    }
                    stats.enqueued += enqueued as u64;
                },
                Some(BrokerEvent::ConnectionLost(reason)) => {
                    return Err(BridgeError::connection_lost(reason));
                },
                None => {
                    return Err(BridgeError::connection_lost("broker event channel closed"));
                },
            }
        }

        info!(
            received = stats.received,
            enqueued = stats.enqueued,
            unmatched = stats.unmatched,
            "router stopped"
        );
        Ok(stats)
    }
}
