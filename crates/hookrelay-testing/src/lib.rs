//! Test infrastructure for hookrelay.
//!
//! Provides an in-memory broker standing in for MQTT, wiremock-backed
//! webhook sinks, configuration fixtures and the deterministic clock.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod broker;
pub mod fixtures;
pub mod http;

pub use broker::{InMemoryBroker, PublishedMessage};
pub use fixtures::{notification, ConfigBuilder};
pub use hookrelay_core::TestClock;
pub use http::{MockSink, ResponseSequence};

/// Installs a test-friendly tracing subscriber once per process.
///
/// Respects `RUST_LOG`; defaults to errors only so test output stays quiet.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("error")),
        )
        .with_test_writer()
        .try_init();
}
