//! Delivery lifecycle events.
//!
//! The dispatcher reports each attempt outcome to an `EventHandler` passed
//! in through `Bridge::start`, so observers can follow progress without
//! reaching into the dispatcher.
//!
//! ```text
//! ┌────────────┐  Delivered / RateLimited / Abandoned  ┌────────────────────┐
//! │ Dispatcher │ ─────────────────────────────────────▶│ MulticastHandler   │
//! └────────────┘                                       └────────────────────┘
//!                                                           │ fan-out
//!                                                           ▼
//!                                                    subscriber handlers
//! ```

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use hookrelay_core::NotificationId;

use crate::error::DeliveryError;

/// Events emitted by the dispatcher.
#[derive(Debug, Clone)]
pub enum DeliveryEvent {
    /// The sink answered 204.
    Delivered {
        /// Notification that was delivered
        id: NotificationId,
        /// Destination URL
        url: String,
        /// Attempts it took, including rate-limited ones
        attempts: u32,
        /// When the sink accepted it
        delivered_at: DateTime<Utc>,
    },

    /// The sink answered 429; the same notification will be re-sent.
    RateLimited {
        /// Notification being retried
        id: NotificationId,
        /// Destination URL
        url: String,
        /// Attempt number that was rate limited (1-based)
        attempt: u32,
        /// Wait before the next attempt
        retry_after: Duration,
    },

    /// Delivery failed for good. The dispatcher stops after this.
    Abandoned {
        /// Notification that was abandoned
        id: NotificationId,
        /// Destination URL
        url: String,
        /// Why delivery failed
        error: DeliveryError,
    },
}

impl DeliveryEvent {
    /// Notification the event refers to.
    pub fn notification_id(&self) -> NotificationId {
        match self {
            Self::Delivered { id, .. }
            | Self::RateLimited { id, .. }
            | Self::Abandoned { id, .. } => *id,
        }
    }
}

/// Receives delivery events.
///
/// Handlers must not block delivery; failures inside a handler are the
/// handler's own business.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync + std::fmt::Debug {
    /// Handles a delivery event.
    async fn handle_event(&self, event: DeliveryEvent);
}

/// Discards all events.
#[derive(Debug, Default)]
pub struct NoOpEventHandler;

impl NoOpEventHandler {
    /// Creates a new no-op event handler.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl EventHandler for NoOpEventHandler {
    async fn handle_event(&self, _event: DeliveryEvent) {}
}

/// Forwards every event to all registered subscribers concurrently.
#[derive(Debug, Clone, Default)]
pub struct MulticastEventHandler {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl MulticastEventHandler {
    /// Creates a new multicast handler with no subscribers.
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Adds a subscriber to receive delivery events.
    pub fn add_subscriber(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Returns the number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

#[async_trait::async_trait]
impl EventHandler for MulticastEventHandler {
    async fn handle_event(&self, event: DeliveryEvent) {
        let futures = self.handlers.iter().map(|handler| {
            let event = event.clone();
            async move {
                handler.handle_event(event).await;
            }
        });

        futures::future::join_all(futures).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug)]
    struct CountingHandler {
        event_count: Arc<AtomicUsize>,
    }

    impl CountingHandler {
        fn new() -> (Self, Arc<AtomicUsize>) {
            let counter = Arc::new(AtomicUsize::new(0));
            (Self { event_count: counter.clone() }, counter)
        }
    }

    #[async_trait::async_trait]
    impl EventHandler for CountingHandler {
        async fn handle_event(&self, _event: DeliveryEvent) {
            self.event_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn delivered_event() -> DeliveryEvent {
        DeliveryEvent::Delivered {
            id: NotificationId::new(),
            url: "https://example.com/webhook".to_string(),
            attempts: 1,
            delivered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn no_op_handler_discards_events() {
        NoOpEventHandler::new().handle_event(delivered_event()).await;
    }

    #[tokio::test]
    async fn multicast_handler_forwards_to_all_subscribers() {
        let mut multicast = MulticastEventHandler::new();
        let (first, first_count) = CountingHandler::new();
        let (second, second_count) = CountingHandler::new();

        multicast.add_subscriber(Arc::new(first));
        multicast.add_subscriber(Arc::new(second));
        assert_eq!(multicast.subscriber_count(), 2);

        multicast.handle_event(delivered_event()).await;

        assert_eq!(first_count.load(Ordering::SeqCst), 1);
        assert_eq!(second_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn multicast_handler_handles_empty_subscribers() {
        MulticastEventHandler::new().handle_event(delivered_event()).await;
    }

    #[test]
    fn events_expose_notification_id() {
        let id = NotificationId::new();
        let event = DeliveryEvent::Abandoned {
            id,
            url: "https://example.com".to_string(),
            error: DeliveryError::network("https://example.com", "refused"),
        };

        assert_eq!(event.notification_id(), id);
    }
}
