//! Core types for provider retry behavior.

use rand::Rng;
use std::time::Duration;

/// Configuration for retry behavior.
///
/// The delay before retry `n` (0-indexed) is
/// `base_delay * backoff_factor^n`, plus up to `jitter` of that value at
/// random, capped at `max_delay`. With `backoff_factor >= 1.0 + jitter`
/// the sequence of delays never decreases.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Fraction of the delay added at random, in `[0.0, 1.0)`
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            ..Default::default()
        }
    }

    /// Set the jitter fraction, clamped into `[0.0, 0.99]`.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 0.99);
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Calculate the delay for a given attempt number (0-indexed), without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.jittered_delay(attempt, 0.0)
    }

    /// Calculate the delay for an attempt with a jitter sample in `[0.0, 1.0)`.
    ///
    /// The sample is scaled by `self.jitter`, so a sample of `0.0` yields the
    /// plain exponential delay.
    pub fn jittered_delay(&self, attempt: u32, sample: f64) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let jitter = self.jitter.clamp(0.0, 0.99) * sample.clamp(0.0, 1.0);
        let capped = (delay * (1.0 + jitter)).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Delay for an attempt using a fresh random jitter sample.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let sample = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(0.0..1.0)
        } else {
            0.0
        };
        self.jittered_delay(attempt, sample)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}
