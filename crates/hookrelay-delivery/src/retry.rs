//! Rate-limit handling for the chat webhook protocol.
//!
//! A 429 response carries the wait time in `X-RateLimit-Reset-After` (or the
//! generic `Retry-After`) as fractional seconds. The dispatcher sleeps that
//! long and re-sends the same notification. Sub-second precision is kept.

use std::{collections::HashMap, time::Duration};

use hookrelay_core::DeliverySettings;
use serde::{Deserialize, Serialize};

/// Header carrying the chat service's rate-limit reset delay.
pub const RESET_AFTER_HEADER: &str = "x-ratelimit-reset-after";

/// Standard HTTP header consulted when the reset header is absent.
pub const RETRY_AFTER_HEADER: &str = "retry-after";

/// How long to wait when the sink rate limits a delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Wait used when the header is missing or unparseable.
    pub default_delay: Duration,

    /// Wait used when the header reports zero seconds.
    pub zero_delay: Duration,

    /// Maximum number of re-sends after a 429. `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            default_delay: Duration::from_secs(2),
            zero_delay: Duration::from_secs(3),
            max_retries: None,
        }
    }
}

impl From<&DeliverySettings> for RateLimitPolicy {
    fn from(settings: &DeliverySettings) -> Self {
        Self { max_retries: settings.max_rate_limit_retries, ..Self::default() }
    }
}

/// Outcome of a rate-limited attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep, then send the same notification again.
    Retry {
        /// How long to wait before the next attempt
        delay: Duration,
    },
    /// The retry cap is reached.
    GiveUp {
        /// Attempts made so far, including the one just rate limited
        attempts: u32,
    },
}

impl RateLimitPolicy {
    /// Delay to honour for a 429 carrying the given header value.
    ///
    /// Zero maps to `zero_delay`. Missing, unparseable, negative or
    /// non-finite values map to `default_delay`.
    pub fn delay_for(&self, header: Option<&str>) -> Duration {
        let Some(seconds) = header.and_then(|value| value.trim().parse::<f64>().ok()) else {
            return self.default_delay;
        };

        if !seconds.is_finite() || seconds < 0.0 {
            return self.default_delay;
        }
        if seconds == 0.0 {
            return self.zero_delay;
        }

        Duration::try_from_secs_f64(seconds).unwrap_or(self.default_delay)
    }

    /// Decides whether attempt number `attempt` (1-based), which was just
    /// rate limited, should be retried.
    pub fn decide(&self, attempt: u32, headers: &HashMap<String, String>) -> RetryDecision {
        if let Some(max_retries) = self.max_retries {
            if attempt > max_retries {
                return RetryDecision::GiveUp { attempts: attempt };
            }
        }

        RetryDecision::Retry { delay: self.delay_for(reset_after_header(headers)) }
    }
}

/// Looks up the rate-limit delay header, preferring the chat service's own.
///
/// Header names are matched case-insensitively.
pub fn reset_after_header(headers: &HashMap<String, String>) -> Option<&str> {
    let find = |name: &str| {
        headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    };

    find(RESET_AFTER_HEADER).or_else(|| find(RETRY_AFTER_HEADER))
}
