//! # Retry Policy Module
//!
//! Exponential backoff for transient list store failures.
//!
//! The consumer loop uses the policy to space out polls while the store is
//! unreachable; producers can wrap individual calls with [`retry_transient`].

use crate::error::QueueError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy configuration for exponential backoff
///
/// # Examples
///
/// ```rust
/// use listq_runtime::retry::RetryPolicy;
/// use std::time::Duration;
///
/// // Default policy: 3 retries, 100ms initial, 5s max, 2.0x multiplier
/// let policy = RetryPolicy::default();
///
/// // Custom policy
/// let policy = RetryPolicy::new(5, Duration::from_millis(250), Duration::from_secs(2), 1.5);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,

    /// Exponential growth factor
    pub backoff_multiplier: f64,

    /// Whether to randomize delays
    pub use_jitter: bool,

    /// Jitter range as a fraction of the delay (0.25 = ±25%)
    pub jitter_percent: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            use_jitter: true,
            jitter_percent: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with ±25% jitter
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            backoff_multiplier,
            use_jitter: true,
            jitter_percent: 0.25,
        }
    }

    /// Disable jitter
    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }

    /// Set custom jitter percentage (0.0 to 1.0)
    pub fn with_jitter_percent(mut self, percent: f64) -> Self {
        self.jitter_percent = percent.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `attempt` (0-based)
    ///
    /// `initial * multiplier^attempt`, capped at `max_delay`, then jittered.
    ///
    /// ```rust
    /// use listq_runtime::retry::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(3), 2.0)
    ///     .without_jitter();
    ///
    /// assert_eq!(policy.calculate_delay(0), Duration::from_secs(1));
    /// assert_eq!(policy.calculate_delay(1), Duration::from_secs(2));
    /// assert_eq!(policy.calculate_delay(2), Duration::from_secs(3));
    /// ```
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let base_secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped_secs = base_secs.min(self.max_delay.as_secs_f64());

        let final_secs = if self.use_jitter {
            Self::add_jitter(capped_secs, self.jitter_percent)
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }

    /// Check if retry number `attempt` (0-based) is still allowed
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Total attempts including the initial one
    pub fn total_attempts(&self) -> u32 {
        self.max_attempts.saturating_add(1)
    }

    fn add_jitter(delay_secs: f64, jitter_percent: f64) -> f64 {
        let jitter_range = delay_secs * jitter_percent;
        if jitter_range <= 0.0 {
            return delay_secs;
        }

        let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        (delay_secs + jitter).max(0.0)
    }
}

/// State tracker for retry operations
#[derive(Debug, Clone)]
pub struct RetryState {
    /// Current retry attempt (0-based)
    pub attempt: u32,

    /// Total attempts made so far (including initial)
    pub total_attempts: u32,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryState {
    /// Create new retry state starting at attempt 0
    pub fn new() -> Self {
        Self {
            attempt: 0,
            total_attempts: 1,
        }
    }

    /// Increment to next retry attempt
    pub fn next_attempt(&mut self) {
        self.attempt += 1;
        self.total_attempts += 1;
    }

    /// Clear the counters after a success
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Get next delay from policy
    pub fn get_delay(&self, policy: &RetryPolicy) -> Duration {
        policy.calculate_delay(self.attempt)
    }

    /// Check if we can retry with this policy
    pub fn can_retry(&self, policy: &RetryPolicy) -> bool {
        policy.should_retry(self.attempt)
    }
}

/// Run a store operation, retrying transient failures per the policy.
///
/// Non-transient errors and the last transient error are returned as is.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, QueueError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, QueueError>>,
{
    let mut state = RetryState::new();
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && state.can_retry(policy) => {
                let delay = state.get_delay(policy);
                warn!(
                    operation = %operation,
                    attempt = state.total_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Transient store failure, retrying"
                );
                tokio::time::sleep(delay).await;
                state.next_attempt();
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
