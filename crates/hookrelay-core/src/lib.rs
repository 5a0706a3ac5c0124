//! Core domain types for the hookrelay bridge.
//!
//! Provides the subscription and notification models, the notification
//! formatter, MQTT topic filter matching, configuration loading and the clock
//! abstraction shared by the delivery and bridge crates.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod format;
pub mod models;
pub mod time;
pub mod topic;

pub use config::{BridgeConfig, DeliverySettings, ServerConfig};
pub use error::{ConfigError, Result};
pub use format::{format_content, WebhookMessage};
pub use models::{NotificationId, QueuedNotification, Subscription};
pub use time::{Clock, RealClock, TestClock};
