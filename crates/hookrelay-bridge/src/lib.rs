//! MQTT to webhook bridge runtime.
//!
//! Connects to the broker, subscribes the configured topics, routes every
//! received message into the delivery queue and shuts down gracefully.
//!
//! ```text
//! ┌────────┐ BrokerEvent ┌────────────────────┐ enqueue ┌───────────────┐
//! │ Broker │────────────▶│ SubscriptionRouter │────────▶│ DeliveryQueue │──▶ Dispatcher
//! └────────┘   (mpsc)    └────────────────────┘         └───────────────┘
//!                                  ▲ cancel                     ▲ meta notice, close
//!                                  └──────── ShutdownCoordinator┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bridge;
pub mod broker;
pub mod error;
pub mod mqtt;
pub mod router;
pub mod shutdown;

pub use bridge::Bridge;
pub use broker::{Broker, BrokerEvent, BrokerEvents, InboundMessage, QoS};
pub use error::{BridgeError, Result};
pub use mqtt::MqttBroker;
pub use router::{Route, RouteTable, RouterStats, SubscriptionRouter};
pub use shutdown::{ShutdownCoordinator, ShutdownReport, ShutdownState};
