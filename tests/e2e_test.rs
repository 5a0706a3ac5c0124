//! End-to-end tests: broker message in, webhook POST out.
//!
//! Runs the full bridge against the in-memory broker and mock sinks,
//! including the graceful shutdown sequence.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use hookrelay_bridge::{Bridge, BrokerEvents, ShutdownState};
use hookrelay_core::{BridgeConfig, RealClock};
use hookrelay_delivery::{DeliveryClient, NoOpEventHandler};
use hookrelay_testing::{init_tracing, ConfigBuilder, InMemoryBroker, MockSink};
use tokio::{sync::oneshot, time::timeout};

async fn start(
    config: BridgeConfig,
    broker: &InMemoryBroker,
    events: BrokerEvents,
) -> Result<Bridge> {
    init_tracing();
    Ok(Bridge::start(
        config,
        Arc::new(broker.clone()),
        events,
        DeliveryClient::with_defaults()?,
        Arc::new(RealClock::new()),
        Arc::new(NoOpEventHandler::new()),
    )
    .await?)
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn message_reaches_only_its_subscription() -> Result<()> {
    let sink = MockSink::start().await;
    sink.accept("/a").await;
    sink.accept("/b").await;
    sink.accept("/meta").await;
    let config = ConfigBuilder::new(sink.webhook_url("/meta"))
        .subscription("topicA", sink.webhook_url("/a"))
        .subscription("topicB", sink.webhook_url("/b"))
        .build();
    let (broker, events) = InMemoryBroker::new();
    let bridge = start(config, &broker, events).await?;

    assert!(broker.publish_inbound("topicA", "door opened").await);

    let (stop, stopped) = oneshot::channel::<()>();
    let running = tokio::spawn(bridge.run_until(async {
        let _ = stopped.await;
    }));

    timeout(Duration::from_secs(5), async {
        while sink.requests_to("/a").await.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    stop.send(()).ok();
    running.await??;

    let to_a = sink.received_contents("/a").await;
    assert_eq!(to_a.len(), 1);
    assert!(to_a[0].contains("topicA"));
    assert!(to_a[0].contains("door opened"));
    assert!(sink.requests_to("/b").await.is_empty());
    Ok(())
}

#[tokio::test]
async fn shutdown_flushes_queue_and_sends_meta_notice_last() -> Result<()> {
    let sink = MockSink::start().await;
    sink.sequence("/a").rate_limited(Some("1")).mount().await;
    sink.accept("/a").await;
    sink.accept("/meta").await;
    let config = ConfigBuilder::new(sink.webhook_url("/meta"))
        .subscription("sensors/+", sink.webhook_url("/a"))
        .build();
    let (broker, events) = InMemoryBroker::new();
    let bridge = start(config, &broker, events).await?;
    let mut state = bridge.state();
    let queue = bridge.queue().clone();

    for n in 0..5 {
        assert!(broker.publish_inbound("sensors/temp", n.to_string()).await);
    }
    // The first notification is held up by the rate limit; the rest queue behind it.
    wait_until(|| queue.len() == 4).await;

    let report = bridge.run_until(async {}).await?;

    assert_eq!(*state.borrow_and_update(), ShutdownState::Stopped);
    assert_eq!(report.dispatched.delivered, 6);
    assert_eq!(report.dispatched.rate_limited, 1);

    let contents = sink.all_contents().await;
    assert!(contents.last().unwrap().contains("meta: `SIGINT/SIGTERM`"));

    let mut delivered = sink.received_contents("/a").await;
    delivered.dedup();
    let payloads: Vec<&str> =
        delivered.iter().map(|content| content.rsplit(": ").next().unwrap()).collect();
    assert_eq!(payloads, vec!["`0`", "`1`", "`2`", "`3`", "`4`"]);

    assert!(broker.is_disconnected());
    Ok(())
}
