//! Retry records and the policy used to reattempt them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::transport::Destination;

/// A failed delivery kept for a later attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryRecord {
    pub correlation_id: String,
    pub payload: Vec<u8>,
    pub destination: Destination,
    pub timestamp: DateTime<Utc>,
    /// Number of store-and-forward attempts already made.
    #[serde(default)]
    pub retry_count: u32,
}

impl RetryRecord {
    /// Create a record stamped with the current time.
    pub fn new(
        correlation_id: impl Into<String>,
        payload: Vec<u8>,
        destination: Destination,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            payload,
            destination,
            timestamp: Utc::now(),
            retry_count: 0,
        }
    }
}

/// Policy for reattempting stored deliveries.
///
/// Attempts are counted per record. The first resend of a stored record is
/// attempt 1, so a record with `retry_count` failed resends behind it is on
/// attempt `retry_count + 1`.
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    /// Never reattempt; a record is discarded on its first failed resend.
    None,

    /// Same delay before every reattempt.
    Fixed {
        /// Failed resends tolerated before the record is discarded.
        max_attempts: u32,
        /// Wait after each failed resend.
        delay: Duration,
    },

    /// Delay doubles with every reattempt.
    Exponential {
        /// Failed resends tolerated before the record is discarded.
        max_attempts: u32,
        /// Wait after the first failed resend.
        initial_delay: Duration,
        /// Upper bound for any single wait.
        max_delay: Duration,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::None
    }
}

impl RetryPolicy {
    /// Exponential backoff starting at 1 second, capped at 5 minutes.
    pub fn exponential(max_attempts: u32) -> Self {
        Self::Exponential {
            max_attempts,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::Fixed { max_attempts, delay }
    }

    /// Delay before reattempt number `attempt` (1-indexed).
    ///
    /// Returns `None` once `attempt` exceeds the allowed attempts.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts() {
            return None;
        }
        match self {
            Self::None => None,
            Self::Fixed { delay, .. } => Some(*delay),
            Self::Exponential {
                initial_delay,
                max_delay,
                ..
            } => {
                let multiplier = 2u32.saturating_pow(attempt - 1);
                let delay = initial_delay.saturating_mul(multiplier);
                Some(delay.min(*max_delay))
            }
        }
    }

    /// Delay before `record` is tried again after its current resend fails.
    pub fn delay_after_failure(&self, record: &RetryRecord) -> Option<Duration> {
        self.delay_for_attempt(record.retry_count.saturating_add(1))
    }

    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Fixed { max_attempts, .. } | Self::Exponential { max_attempts, .. } => {
                *max_attempts
            }
        }
    }
}
