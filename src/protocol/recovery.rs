//! Retry policy for recoverable link failures.
//!
//! Timeouts and garbled frames are retried by resending the same command,
//! but only when the command declares itself safe to resend. Errors reported
//! by the instrument and lost links are never retried.

use crate::error::SpectroError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How many times to resend a command, and how long to wait in between.
///
/// ```rust
/// use spectro_daq::protocol::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy {
///     max_attempts: 5,
///     backoff_delay: Duration::from_millis(200),
/// };
/// assert!(policy.allows(4));
/// assert!(!policy.allows(5));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt. 0 disables retrying.
    pub max_attempts: u32,

    /// Constant delay before each retry.
    #[serde(with = "millis")]
    pub backoff_delay: Duration,
}

impl Default for RetryPolicy {
    /// Two retries, 100 ms apart.
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub const fn none() -> Self {
        Self {
            max_attempts: 0,
            backoff_delay: Duration::ZERO,
        }
    }

    /// Whether another retry is allowed after `retries_so_far` retries.
    pub fn allows(&self, retries_so_far: u32) -> bool {
        retries_so_far < self.max_attempts
    }

    /// Whether `error` from a command with the given `retryable` flag should
    /// be retried after `retries_so_far` retries.
    pub fn should_retry(&self, error: &SpectroError, retryable: bool, retries_so_far: u32) -> bool {
        retryable && error.is_recoverable() && self.allows(retries_so_far)
    }

    /// Sleep for the backoff delay.
    pub async fn backoff(&self) {
        if !self.backoff_delay.is_zero() {
            tokio::time::sleep(self.backoff_delay).await;
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
