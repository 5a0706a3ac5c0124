//! Webhook delivery pipeline.
//!
//! Notifications flow through a bounded FIFO queue to a single dispatcher
//! that posts them one at a time, honouring the sink's rate-limit protocol.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────────┐   ┌────────────┐   ┌─────────────┐
//! │ Producers │──▶│ DeliveryQueue │──▶│ Dispatcher │──▶│ HTTP Client │
//! └───────────┘   └───────────────┘   └────────────┘   └─────────────┘
//!                   bounded, FIFO        │      ▲
//!                                        ▼      │ 429: sleep, retry same
//!                                  ┌──────────────┐
//!                                  │ EventHandler │
//!                                  └──────────────┘
//! ```
//!
//! A notification is either `Delivered` (HTTP 204) or `Abandoned`. An
//! abandoned notification stops the dispatcher: the bridge fails fast rather
//! than silently dropping messages.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod queue;
pub mod retry;

pub use client::{ClientConfig, DeliveryClient, DeliveryResponse};
pub use dispatcher::{DispatchOutcome, DispatchStats, Dispatcher};
pub use error::{DeliveryError, Result};
pub use events::{DeliveryEvent, EventHandler, MulticastEventHandler, NoOpEventHandler};
pub use queue::{DeliveryQueue, QueueClosed};
pub use retry::RateLimitPolicy;
