//! Retry behaviour for completion calls

use crate::error::RetryConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the retrying completion client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum calls to the service per logical request
    pub max_attempts: u32,

    /// Backoff after the first rate-limited attempt; doubles per attempt
    pub base_backoff: Duration,

    /// Fixed pause after a transient failure
    pub transient_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            transient_delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RetryConfigError> {
        if self.max_attempts == 0 {
            return Err(RetryConfigError::Config(
                "max_attempts must be greater than 0".to_string(),
            ));
        }

        // 2^31 seconds of backoff is already absurd
        if self.max_attempts > 32 {
            return Err(RetryConfigError::Config(
                "max_attempts must be at most 32".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_backoff(mut self, delay: Duration) -> Self {
        self.base_backoff = delay;
        self
    }

    pub fn with_transient_delay(mut self, delay: Duration) -> Self {
        self.transient_delay = delay;
        self
    }

    /// Delay after rate-limited attempt `attempt` (1-based): `base * 2^(attempt-1)`
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_backoff.saturating_mul(1u32 << exponent)
    }

    /// Worst-case backoff across a full run of rate-limited attempts
    pub fn max_total_backoff(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.backoff_for(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}
