//! Fixed-delay retry policies for publishing and reconnecting.
//!
//! Publishing retries a bounded number of times with a fixed pause between
//! attempts. Reconnecting retries forever with a fixed pause so a recovering
//! broker is not stormed with handshakes.
//!
//! # Example
//!
//! ```rust
//! use ticket_relay_runtime::policy::{PublishPolicy, ReconnectPolicy};
//! use std::time::Duration;
//!
//! let publish = PublishPolicy::builder()
//!     .max_attempts(3)
//!     .retry_delay(Duration::from_secs(1))
//!     .send_timeout(Duration::from_secs(5))
//!     .build();
//!
//! let reconnect = ReconnectPolicy::new(Duration::from_secs(5));
//! assert_eq!(publish.max_attempts, 3);
//! assert_eq!(reconnect.delay, Duration::from_secs(5));
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Retry policy for a single publish call.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `retry_delay`: 1 second
/// - `send_timeout`: 5 seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Pause between two attempts
    pub retry_delay: Duration,
    /// Upper bound on a single send; an elapsed send counts as a failed attempt
    pub send_timeout: Duration,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

impl PublishPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> PublishPolicyBuilder {
        PublishPolicyBuilder {
            max_attempts: None,
            retry_delay: None,
            send_timeout: None,
        }
    }

    /// Number of attempts actually made, never less than one.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Worst-case time spent waiting between attempts.
    #[must_use]
    pub fn total_backoff(&self) -> Duration {
        self.retry_delay * (self.attempts() - 1)
    }
}

/// Builder for [`PublishPolicy`].
#[derive(Debug, Clone)]
pub struct PublishPolicyBuilder {
    max_attempts: Option<u32>,
    retry_delay: Option<Duration>,
    send_timeout: Option<Duration>,
}

impl PublishPolicyBuilder {
    /// Set maximum number of attempts.
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Set the pause between attempts.
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Set the per-send timeout.
    #[must_use]
    pub const fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Build the [`PublishPolicy`].
    #[must_use]
    pub fn build(self) -> PublishPolicy {
        PublishPolicy {
            max_attempts: self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            retry_delay: self.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
            send_timeout: self.send_timeout.unwrap_or(DEFAULT_SEND_TIMEOUT),
        }
    }
}

/// Reconnection policy for the supervisor.
///
/// There is no attempt ceiling: the supervisor retries until it connects or
/// the client is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Pause after each failed reconnect attempt
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// Create a policy with the given fixed delay.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}
