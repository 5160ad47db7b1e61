//! Retry loop around a [`CompletionService`]

use std::sync::Arc;

use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::completion::{ChatTurn, CompletionError, CompletionFailure, CompletionService, RetryConfig};
use crate::metrics::{CallOutcome, MetricsSink, NoopMetrics};

/// Metrics name for one logical completion call
pub const COMPLETION_CALL: &str = "completion";

/// Completion client with bounded retries
///
/// Each call to [`complete`](Self::complete) starts from attempt 1 and makes
/// at most `max_attempts` calls to the service:
/// - success returns immediately
/// - `RateLimited` sleeps `base_backoff * 2^(n-1)` before attempt `n + 1`
/// - `Transient` sleeps `transient_delay` before attempt `n + 1`
/// - `Provider` fails without further attempts
pub struct RetryingCompletionClient {
    service: Arc<dyn CompletionService>,
    config: RetryConfig,
    metrics: Arc<dyn MetricsSink>,
}

impl RetryingCompletionClient {
    /// Create a client with default retry settings
    pub fn new(service: Arc<dyn CompletionService>) -> Self {
        Self {
            service,
            config: RetryConfig::default(),
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Generate a reply, retrying per the configured policy
    pub async fn complete(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, CompletionFailure> {
        let started = Instant::now();
        let result = self.run_attempts(prompt, history).await;

        let outcome = match &result {
            Ok(_) => CallOutcome::Success,
            Err(CompletionFailure::RateLimited { .. }) => CallOutcome::RateLimited,
            Err(_) => CallOutcome::Failed,
        };
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.metrics.record_call(COMPLETION_CALL, elapsed_ms, outcome);

        result
    }

    async fn run_attempts(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, CompletionFailure> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!("Completion attempt {}/{}", attempt, max_attempts);

            let delay = match self.service.generate(prompt, history).await {
                Ok(text) => {
                    if attempt > 1 {
                        info!("Completion succeeded on attempt {}/{}", attempt, max_attempts);
                    }
                    return Ok(text);
                }
                Err(CompletionError::Provider(cause)) => {
                    error!("Completion rejected by provider: {}", cause);
                    return Err(CompletionFailure::Provider { attempt, cause });
                }
                Err(CompletionError::RateLimited(detail)) => {
                    if attempt >= max_attempts {
                        warn!("Still rate limited after {} attempts: {}", attempt, detail);
                        return Err(CompletionFailure::RateLimited { attempts: attempt });
                    }
                    self.config.backoff_for(attempt)
                }
                Err(CompletionError::Transient(cause)) => {
                    if attempt >= max_attempts {
                        error!("Completion failed after {} attempts: {}", attempt, cause);
                        return Err(CompletionFailure::Exhausted {
                            attempts: attempt,
                            last_error: cause,
                        });
                    }
                    debug!("Transient completion error: {}", cause);
                    self.config.transient_delay
                }
            };

            warn!(
                "Completion failed (attempt {}/{}), retrying after {:?}",
                attempt, max_attempts, delay
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}
