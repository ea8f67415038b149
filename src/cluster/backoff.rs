//! Exponential backoff with jitter between delivery retries

use std::time::Duration;

use rand::Rng;

use crate::config::ClusterConfig;

/// Exponential backoff configuration
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier for exponential growth
    pub multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            multiplier: 2.0,
            jitter_factor: 0.2, // 20% jitter
        }
    }
}

impl From<&ClusterConfig> for BackoffConfig {
    fn from(config: &ClusterConfig) -> Self {
        Self {
            initial_delay_ms: config.backoff_base_ms,
            max_delay_ms: config.backoff_max_ms,
            multiplier: config.backoff_factor,
            jitter_factor: config.backoff_jitter.clamp(0.0, 1.0),
        }
    }
}

/// Exponential backoff calculator with jitter.
///
/// One instance covers the retries of a single peer delivery.
pub struct ExponentialBackoff {
    config: BackoffConfig,
    attempt: u32,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff with default configuration
    pub fn new() -> Self {
        Self::with_config(BackoffConfig::default())
    }

    /// Create a new exponential backoff with custom configuration
    pub fn with_config(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay before the next retry.
    ///
    /// Retry `n` waits `min(initial * multiplier^(n-1), max)`, scaled by a
    /// random factor in `[1 - jitter, 1 + jitter]` and capped again at max.
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.attempt.min(i32::MAX as u32) as i32;
        self.attempt += 1;

        let max = self.config.max_delay_ms as f64;
        let base_delay = self.config.initial_delay_ms as f64 * self.config.multiplier.powi(exponent);
        let capped_delay = base_delay.min(max);

        // Apply jitter only if jitter_factor > 0
        let final_delay = if self.config.jitter_factor > 0.0 {
            let jitter = self.config.jitter_factor;
            let scale = rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter));
            (capped_delay * scale).min(max)
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay.max(0.0) as u64)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}
