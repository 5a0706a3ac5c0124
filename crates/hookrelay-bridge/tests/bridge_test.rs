//! Bridge lifecycle tests: startup, fatal errors and shutdown.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::{
    future,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use hookrelay_bridge::{Bridge, BridgeError, BrokerEvents, QoS, ShutdownState};
use hookrelay_core::BridgeConfig;
use hookrelay_delivery::{
    ClientConfig, DeliveryClient, DeliveryError, DeliveryEvent, EventHandler,
    MulticastEventHandler, NoOpEventHandler,
};
use hookrelay_testing::{init_tracing, ConfigBuilder, InMemoryBroker, MockSink, TestClock};
use tokio::time::timeout;

#[derive(Debug, Default)]
struct RecordingHandler {
    events: Mutex<Vec<DeliveryEvent>>,
}

#[async_trait::async_trait]
impl EventHandler for RecordingHandler {
    async fn handle_event(&self, event: DeliveryEvent) {
        self.events.lock().unwrap().push(event);
    }
}

async fn start(config: BridgeConfig, broker: &InMemoryBroker, events: BrokerEvents) -> Bridge {
    start_with_handler(config, broker, events, Arc::new(NoOpEventHandler::new())).await
}

async fn start_with_handler(
    config: BridgeConfig,
    broker: &InMemoryBroker,
    events: BrokerEvents,
    handler: Arc<dyn EventHandler>,
) -> Bridge {
    init_tracing();
    let client = DeliveryClient::new(ClientConfig::from(&config.delivery)).unwrap();
    let clock = Arc::new(TestClock::new());
    Bridge::start(config, Arc::new(broker.clone()), events, client, clock, handler).await.unwrap()
}

#[tokio::test]
async fn status_topic_tracks_lifecycle() -> Result<()> {
    let sink = MockSink::start().await;
    sink.accept("/meta").await;
    let config = ConfigBuilder::new(sink.webhook_url("/meta"))
        .topic_prefix("site/")
        .status_topic("bridge/status")
        .subscription("a", sink.webhook_url("/a"))
        .build();
    let (broker, events) = InMemoryBroker::new();

    let bridge = start(config, &broker, events).await;
    let published = broker.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "site/bridge/status");
    assert_eq!(published[0].payload_text(), "online");
    assert!(published[0].retain);
    assert_eq!(published[0].qos, QoS::AtLeastOnce);

    let mut state = bridge.state();
    let report = bridge.run_until(future::ready(())).await?;

    assert_eq!(*state.borrow_and_update(), ShutdownState::Stopped);
    assert_eq!(report.dispatched.delivered, 1);
    let published = broker.published();
    assert_eq!(published.last().unwrap().payload_text(), "offline");
    assert!(broker.is_disconnected());
    assert_eq!(sink.received_contents("/meta").await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn rejected_delivery_stops_the_bridge() {
    let sink = MockSink::start().await;
    sink.respond_always("/a", 400).await;
    let config = ConfigBuilder::new(sink.webhook_url("/meta"))
        .subscription("a", sink.webhook_url("/a"))
        .build();
    let (broker, events) = InMemoryBroker::new();
    let bridge = start(config, &broker, events).await;

    broker.publish_inbound("a", "payload").await;
    let result =
        timeout(Duration::from_secs(5), bridge.run_until(future::pending())).await.unwrap();

    match result {
        Err(BridgeError::Delivery(DeliveryError::Rejected { status_code, payload, .. })) => {
            assert_eq!(status_code, 400);
            assert!(payload.contains("a: `payload`"));
        },
        other => panic!("expected rejected delivery, got {other:?}"),
    }
    assert!(sink.received_contents("/meta").await.is_empty());
}

#[tokio::test]
async fn lost_broker_connection_stops_the_bridge() {
    let sink = MockSink::start().await;
    let config = ConfigBuilder::new(sink.webhook_url("/meta"))
        .subscription("a", sink.webhook_url("/a"))
        .build();
    let (broker, events) = InMemoryBroker::new();
    let bridge = start(config, &broker, events).await;

    broker.drop_connection("keep-alive timeout").await;
    let result =
        timeout(Duration::from_secs(5), bridge.run_until(future::pending())).await.unwrap();

    assert!(matches!(result, Err(BridgeError::ConnectionLost { .. })));
}

#[tokio::test]
async fn slow_sink_hits_drain_deadline() {
    let sink = MockSink::start().await;
    sink.accept_slowly("/meta", Duration::from_secs(10)).await;
    let config = ConfigBuilder::new(sink.webhook_url("/meta"))
        .subscription("a", sink.webhook_url("/a"))
        .drain_timeout_seconds(1)
        .build();
    let (broker, events) = InMemoryBroker::new();
    let bridge = start(config, &broker, events).await;
    let state = bridge.state();

    let result =
        timeout(Duration::from_secs(5), bridge.run_until(future::ready(()))).await.unwrap();

    assert!(matches!(result, Err(BridgeError::DrainTimeout { .. })));
    assert_eq!(*state.borrow(), ShutdownState::Draining);
    assert!(!broker.is_disconnected());
}

#[tokio::test]
async fn retry_cap_abandons_rate_limited_notification() {
    let sink = MockSink::start().await;
    sink.respond_always("/a", 429).await;
    let config = ConfigBuilder::new(sink.webhook_url("/meta"))
        .subscription("a", sink.webhook_url("/a"))
        .max_rate_limit_retries(1)
        .build();
    let (broker, events) = InMemoryBroker::new();

    let recorder = Arc::new(RecordingHandler::default());
    let mut multicast = MulticastEventHandler::new();
    multicast.add_subscriber(recorder.clone());
    multicast.add_subscriber(Arc::new(NoOpEventHandler::new()));
    let bridge = start_with_handler(config, &broker, events, Arc::new(multicast)).await;

    broker.publish_inbound("a", "payload").await;
    let result =
        timeout(Duration::from_secs(5), bridge.run_until(future::pending())).await.unwrap();

    assert!(matches!(
        result,
        Err(BridgeError::Delivery(DeliveryError::RetriesExhausted { attempts: 2, .. }))
    ));
    assert_eq!(sink.requests_to("/a").await.len(), 2);

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], DeliveryEvent::RateLimited { attempt: 1, .. }));
    assert!(matches!(events[1], DeliveryEvent::Abandoned { .. }));
}

#[tokio::test]
async fn request_timeout_is_fatal() {
    let sink = MockSink::start().await;
    sink.accept_slowly("/a", Duration::from_secs(3)).await;
    let config = ConfigBuilder::new(sink.webhook_url("/meta"))
        .subscription("a", sink.webhook_url("/a"))
        .request_timeout_seconds(1)
        .build();
    let (broker, events) = InMemoryBroker::new();
    let bridge = start(config, &broker, events).await;

    broker.publish_inbound("a", "payload").await;
    let result =
        timeout(Duration::from_secs(5), bridge.run_until(future::pending())).await.unwrap();

    match result {
        Err(BridgeError::Delivery(DeliveryError::Timeout { timeout_seconds, .. })) => {
            assert_eq!(timeout_seconds, 1);
        },
        other => panic!("expected request timeout, got {other:?}"),
    }
}
