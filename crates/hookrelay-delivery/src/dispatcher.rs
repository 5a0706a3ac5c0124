//! Single-worker dispatcher that drains the delivery queue.
//!
//! Notifications are posted strictly one at a time in queue order. A 429
//! puts the whole pipeline to sleep and re-sends the same notification, so
//! ordering is preserved across rate limits. Any other failure is fatal: the
//! dispatcher logs the destination, status and payload, closes the queue and
//! returns the error.

use std::sync::Arc;

use hookrelay_core::{models::redact_url, Clock, QueuedNotification};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::{
    client::DeliveryClient,
    error::{DeliveryError, Result},
    events::{DeliveryEvent, EventHandler, NoOpEventHandler},
    queue::DeliveryQueue,
    retry::{RateLimitPolicy, RetryDecision},
};

/// Terminal outcome of one notification.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The sink answered 204.
    Delivered {
        /// Attempts it took, including rate-limited ones
        attempts: u32,
    },
    /// Delivery failed for good.
    Abandoned {
        /// Why delivery failed
        error: DeliveryError,
    },
}

impl DispatchOutcome {
    /// Returns `true` for `Delivered`.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Counters for dispatcher monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Notifications the sink accepted.
    pub delivered: u64,
    /// Attempts answered with 429.
    pub rate_limited: u64,
    /// Notifications abandoned.
    pub abandoned: u64,
    /// HTTP requests sent.
    pub attempts: u64,
}

/// Consumes the delivery queue and posts each notification.
#[derive(Debug)]
pub struct Dispatcher {
    queue: DeliveryQueue,
    client: DeliveryClient,
    policy: RateLimitPolicy,
    clock: Arc<dyn Clock>,
    event_handler: Arc<dyn EventHandler>,
    stats: Arc<RwLock<DispatchStats>>,
}

impl Dispatcher {
    /// Creates a dispatcher around an existing client and policy.
    pub fn with_client(
        queue: DeliveryQueue,
        client: DeliveryClient,
        policy: RateLimitPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            queue,
            client,
            policy,
            clock,
            event_handler: Arc::new(NoOpEventHandler),
            stats: Arc::new(RwLock::new(DispatchStats::default())),
        }
    }

    /// Replaces the event handler.
    #[must_use]
    pub fn with_event_handler(mut self, event_handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = event_handler;
        self
    }

    /// Shared handle to the live counters.
    pub fn stats_handle(&self) -> Arc<RwLock<DispatchStats>> {
        self.stats.clone()
    }

    /// Runs until the queue is closed and drained.
    ///
    /// # Errors
    ///
    /// Returns the first fatal delivery error. The queue is closed before
    /// returning so producers stop instead of blocking on a full queue.
    pub async fn run(self) -> Result<DispatchStats> {
        info!(capacity = self.queue.capacity(), "dispatcher started");

        while let Some(notification) = self.queue.dequeue().await {
            if let DispatchOutcome::Abandoned { error } = self.dispatch(&notification).await {
                error!(
                    notification_id = %notification.id,
                    url = %notification.destination_url,
                    status = ?error.status_code(),
                    payload = %notification.body_text(),
                    error = %error,
                    "delivery failed, stopping dispatcher"
                );
                self.queue.close();
                return Err(error);
            }
        }

        let stats = self.stats.read().await.clone();
        info!(
            delivered = stats.delivered,
            rate_limited = stats.rate_limited,
            "dispatcher stopped, queue drained"
        );
        Ok(stats)
    }

    /// Delivers one notification, retrying for as long as the sink rate
    /// limits it and the policy allows.
    pub async fn dispatch(&self, notification: &QueuedNotification) -> DispatchOutcome {
        let url = notification.destination_url.as_str();
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            self.stats.write().await.attempts += 1;

            let response = match self.client.deliver(notification).await {
                Ok(response) => response,
                Err(error) => return self.abandon(notification, error).await,
            };

            if response.is_delivered() {
                self.stats.write().await.delivered += 1;
                debug!(
                    notification_id = %notification.id,
                    url = %redact_url(url),
                    attempts = attempt,
                    "notification delivered"
                );
                self.event_handler
                    .handle_event(DeliveryEvent::Delivered {
                        id: notification.id,
                        url: url.to_string(),
                        attempts: attempt,
                        delivered_at: self.clock.now_utc(),
                    })
                    .await;
                return DispatchOutcome::Delivered { attempts: attempt };
            }

            if !response.is_rate_limited() {
                let error = DeliveryError::rejected(
                    url,
                    response.status_code,
                    response.body,
                    notification.body_text(),
                );
                return self.abandon(notification, error).await;
            }

            self.stats.write().await.rate_limited += 1;

            match self.policy.decide(attempt, &response.headers) {
                RetryDecision::Retry { delay } => {
                    warn!(
                        notification_id = %notification.id,
                        url = %redact_url(url),
                        attempt,
                        retry_after_ms = delay.as_millis(),
                        "rate limited, waiting before retry"
                    );
                    self.event_handler
                        .handle_event(DeliveryEvent::RateLimited {
                            id: notification.id,
                            url: url.to_string(),
                            attempt,
                            retry_after: delay,
                        })
                        .await;
                    self.clock.sleep(delay).await;
                },
                RetryDecision::GiveUp { attempts } => {
                    let error = DeliveryError::retries_exhausted(url, attempts);
                    return self.abandon(notification, error).await;
                },
            }
        }
    }

    async fn abandon(
        &self,
        notification: &QueuedNotification,
        error: DeliveryError,
    ) -> DispatchOutcome {
        self.stats.write().await.abandoned += 1;
        self.event_handler
            .handle_event(DeliveryEvent::Abandoned {
                id: notification.id,
                url: notification.destination_url.clone(),
                error: error.clone(),
            })
            .await;
        DispatchOutcome::Abandoned { error }
    }
}
