//! Concurrency tests for the bounded delivery queue.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use hookrelay_delivery::DeliveryQueue;
use hookrelay_testing::notification;
use tokio::time::timeout;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn capacity_holds_under_concurrent_producers() {
    const PRODUCERS: usize = 8;
    const PER_PRODUCER: usize = 50;
    const CAPACITY: usize = 5;

    let queue = DeliveryQueue::new(CAPACITY);
    let max_seen = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let queue = queue.clone();
            let max_seen = max_seen.clone();
            tokio::spawn(async move {
                for n in 0..PER_PRODUCER {
                    let url = format!("http://sink/{producer}");
                    queue.enqueue(notification(&url, "load", &n.to_string())).await.unwrap();
                    max_seen.fetch_max(queue.len(), Ordering::SeqCst);
                }
            })
        })
        .collect();

    let consumer = {
        let queue = queue.clone();
        let max_seen = max_seen.clone();
        tokio::spawn(async move {
            let mut per_producer: Vec<Vec<String>> = vec![Vec::new(); PRODUCERS];
            while let Some(item) = queue.dequeue().await {
                max_seen.fetch_max(queue.len(), Ordering::SeqCst);
                let producer: usize =
                    item.destination_url.rsplit('/').next().unwrap().parse().unwrap();
                per_producer[producer].push(item.body_text().into_owned());
                tokio::task::yield_now().await;
            }
            per_producer
        })
    };

    for producer in producers {
        producer.await.unwrap();
    }
    queue.close();

    let per_producer = timeout(Duration::from_secs(10), consumer).await.unwrap().unwrap();

    assert!(max_seen.load(Ordering::SeqCst) <= CAPACITY);
    for received in per_producer {
        assert_eq!(received.len(), PER_PRODUCER);
        let payloads: Vec<usize> = received
            .iter()
            .map(|body| {
                let start = body.rfind(": `").unwrap() + 3;
                let end = body[start..].find('`').unwrap() + start;
                body[start..end].parse().unwrap()
            })
            .collect();
        let expected: Vec<usize> = (0..PER_PRODUCER).collect();
        assert_eq!(payloads, expected, "each producer's items stay in order");
    }
}

#[tokio::test]
async fn producers_blocked_on_full_queue_fail_when_closed() {
    let queue = DeliveryQueue::new(1);
    queue.enqueue(notification("http://sink/0", "t", "first")).await.unwrap();

    let blocked: Vec<_> = (0..3)
        .map(|n| {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue.enqueue(notification("http://sink/1", "t", &n.to_string())).await
            })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(20)).await;

    queue.close();

    for producer in blocked {
        let result = timeout(Duration::from_secs(1), producer).await.unwrap().unwrap();
        assert!(result.is_err());
    }
    assert_eq!(queue.dequeue().await.unwrap().destination_url, "http://sink/0");
    assert!(queue.dequeue().await.is_none());
}
