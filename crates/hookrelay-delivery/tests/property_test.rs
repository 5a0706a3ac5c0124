//! Property-based tests for rate-limit delays and queue ordering.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use hookrelay_delivery::{DeliveryQueue, RateLimitPolicy};
use hookrelay_testing::notification;
use proptest::{prelude::*, test_runner::Config as ProptestConfig};

fn proptest_config() -> ProptestConfig {
    ProptestConfig {
        cases: 200,
        fork: false,
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn positive_header_values_are_honoured_exactly(millis in 1u64..600_000) {
        let policy = RateLimitPolicy::default();
        let header = format!("{}.{:03}", millis / 1000, millis % 1000);

        prop_assert_eq!(policy.delay_for(Some(&header)), Duration::from_millis(millis));
    }

    #[test]
    fn non_numeric_headers_fall_back_to_default(header in "[a-z]{1,16}") {
        let policy = RateLimitPolicy::default();

        prop_assert_eq!(policy.delay_for(Some(&header)), Duration::from_secs(2));
    }

    #[test]
    fn queue_preserves_fifo_order(count in 1usize..64, capacity in 1usize..16) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();

        let received = runtime.block_on(async {
            let queue = DeliveryQueue::new(capacity);
            let producer = {
                let queue = queue.clone();
                tokio::spawn(async move {
                    for n in 0..count {
                        let url = format!("http://sink/{n}");
                        queue.enqueue(notification(&url, "t", "p")).await.unwrap();
                    }
                    queue.close();
                })
            };

            let mut received = Vec::new();
            while let Some(item) = queue.dequeue().await {
                prop_assert!(queue.len() <= capacity);
                received.push(item.destination_url);
            }
            producer.await.unwrap();
            Ok(received)
        })?;

        let expected: Vec<String> = (0..count).map(|n| format!("http://sink/{n}")).collect();
        prop_assert_eq!(received, expected);
    }
}
