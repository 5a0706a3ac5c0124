//! Bridge runtime wiring the broker, router, queue and dispatcher together.

use std::{future::Future, sync::Arc, time::Duration};

use bytes::Bytes;
use hookrelay_core::{BridgeConfig, Clock};
use hookrelay_delivery::{
    DeliveryClient, DeliveryQueue, Dispatcher, EventHandler, RateLimitPolicy,
};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{
    broker::{Broker, BrokerEvents, QoS, STATUS_OFFLINE, STATUS_ONLINE},
    error::{BridgeError, Result},
    router::{RouteTable, SubscriptionRouter},
    shutdown::{DispatcherTask, RouterTask, ShutdownCoordinator, ShutdownReport, ShutdownState},
};

/// Time allowed for the broker to flush outstanding packets on disconnect.
pub const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

/// A running bridge.
#[derive(Debug)]
pub struct Bridge {
    config: Arc<BridgeConfig>,
    broker: Arc<dyn Broker>,
    queue: DeliveryQueue,
    coordinator: ShutdownCoordinator,
    router_task: RouterTask,
    dispatcher_task: DispatcherTask,
}

impl Bridge {
    /// Subscribes every configured topic, announces the bridge as online
    /// and starts the router and dispatcher tasks.
    ///
    /// # Errors
    ///
    /// Returns the first failing subscribe or status publish.
    pub async fn start(
        config: BridgeConfig,
        broker: Arc<dyn Broker>,
        events: BrokerEvents,
        client: DeliveryClient,
        clock: Arc<dyn Clock>,
        event_handler: Arc<dyn EventHandler>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let queue = DeliveryQueue::new(config.delivery.queue_capacity);

        let router = SubscriptionRouter::new(
            Arc::new(RouteTable::from_config(&config)),
            queue.clone(),
            clock.clone(),
        );
        router.subscribe_all(broker.as_ref()).await?;

        if let Some(status_topic) = config.mqtt_server.status_topic() {
            let online = Bytes::from_static(STATUS_ONLINE.as_bytes());
            broker.publish(&status_topic, QoS::AtLeastOnce, true, online).await?;
        }

        let coordinator = ShutdownCoordinator::new(
            queue.clone(),
            config.mqtt_server.meta_webhook.clone(),
            config.delivery.drain_timeout(),
            clock.clone(),
        );

        let dispatcher = Dispatcher::with_client(
            queue.clone(),
            client,
            RateLimitPolicy::from(&config.delivery),
            clock,
        )
        .with_event_handler(event_handler);

        let dispatcher_task = tokio::spawn(dispatcher.run());
        let router_task = tokio::spawn(router.run(events, coordinator.router_cancellation()));

        info!(
            subscriptions = config.subscriptions.len(),
            queue_capacity = queue.capacity(),
            "bridge running"
        );

        Ok(Self { config, broker, queue, coordinator, router_task, dispatcher_task })
    }

    /// Watches lifecycle state transitions.
    pub fn state(&self) -> watch::Receiver<ShutdownState> {
        self.coordinator.subscribe()
    }

    /// Handle to the delivery queue.
    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    /// Runs until `signal` resolves, then drains and disconnects.
    ///
    /// Returns early with the fatal error if the dispatcher abandons a
    /// notification or the broker connection is lost.
    ///
    /// # Errors
    ///
    /// - `Delivery` when a notification could not be delivered
    /// - `ConnectionLost` when the broker connection drops
    /// - `DrainTimeout` when draining exceeds the configured deadline
    pub async fn run_until<F>(mut self, signal: F) -> Result<ShutdownReport>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            () = signal => {
                info!("shutdown signal received");
            },
            result = &mut self.dispatcher_task => {
                self.router_task.abort();
                return Err(match result {
                    Ok(Err(e)) => e.into(),
                    Ok(Ok(_)) => BridgeError::task_failed("dispatcher", "stopped before shutdown"),
                    Err(e) => BridgeError::task_failed("dispatcher", e.to_string()),
                });
            },
            result = &mut self.router_task => {
                self.dispatcher_task.abort();
                let error = match result {
                    Ok(Err(e)) => e,
                    Ok(Ok(_)) => BridgeError::task_failed("router", "stopped before shutdown"),
                    Err(e) => BridgeError::task_failed("router", e.to_string()),
                };
                error!(error = %error, "router stopped");
                return Err(error);
            },
        }

        let report = self.coordinator.drain(self.router_task, self.dispatcher_task).await?;

        if let Some(status_topic) = self.config.mqtt_server.status_topic() {
            let offline = Bytes::from_static(STATUS_OFFLINE.as_bytes());
            let published =
                self.broker.publish(&status_topic, QoS::AtLeastOnce, true, offline).await;
            if let Err(e) = published {
                warn!("failed to publish offline status: {}", e);
            }
        }

        self.broker.disconnect(DISCONNECT_GRACE).await?;
        info!(delivered = report.dispatched.delivered, "bridge stopped");

        Ok(report)
    }
}
