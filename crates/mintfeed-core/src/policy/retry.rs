//! Attempt-budgeted retry policy with fixed or exponential spacing.
//!
//! The resolver uses the fixed form: indexing lag on the node is small and
//! bounded, so every attempt waits the same `delay`. The WebSocket client
//! spaces its reconnects with the exponential form.

use std::time::Duration;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed,
    /// `delay * multiplier^(n-1)`, capped at `max_delay`.
    Exponential { multiplier: f64, max_delay: Duration },
}

/// Configuration for the retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Base delay between attempts.
    pub delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(2_000),
            backoff: Backoff::Fixed,
        }
    }
}

/// Stateless retry policy: computes the delay after a given failed attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// `max_attempts` tries separated by a constant `delay`.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(RetryConfig {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
        })
    }

    /// Number of attempts the policy allows (never zero).
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    ///
    /// Returns `None` once `attempt` is the last allowed one: there is no
    /// point sleeping after the final failure.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts() {
            return None;
        }
        let delay = match self.config.backoff {
            Backoff::Fixed => self.config.delay,
            Backoff::Exponential {
                multiplier,
                max_delay,
            } => {
                let exponent = (attempt - 1).min(64) as i32;
                let ms = self.config.delay.as_millis() as f64 * multiplier.powi(exponent);
                Duration::from_millis(ms.min(max_delay.as_millis() as f64) as u64)
            }
        };
        Some(delay)
    }
}
