//! # manualbot-core
//!
//! Request-handling core for the network manual chatbot: an on-disk answer
//! cache and a completion client with bounded retries.
//!
//! ## Features
//!
//! - Question-keyed cache with lazy TTL expiry and bounded retention
//! - Hit/miss accounting with a zero-safe hit rate
//! - Retry loop with exponential backoff for rate limits
//! - Tagged completion error kinds instead of exception matching
//! - Injected metrics sink around every logical call
//!
//! ## Response Cache
//!
//! ```no_run
//! use manualbot_core::{CacheConfig, CacheStore};
//!
//! fn main() -> anyhow::Result<()> {
//!     let cache = CacheStore::new(CacheConfig::default())?;
//!
//!     if let Some(entry) = cache.lookup("VRRPの設定手順は？") {
//!         println!("{}", entry.answer);
//!     }
//!     println!("Hit rate: {:.1}%", cache.stats().hit_rate_percent);
//!     Ok(())
//! }
//! ```
//!
//! ## Completion with Retry
//!
//! Wrap any [`CompletionService`] to get rate-limit backoff (1s, 2s, 4s ...),
//! a fixed pause after transient faults and no retries for provider errors.
//!
//! ```no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use manualbot_core::{ChatTurn, CompletionError, CompletionService, RetryingCompletionClient};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl CompletionService for Echo {
//!     async fn generate(&self, prompt: &str, _history: &[ChatTurn]) -> Result<String, CompletionError> {
//!         Ok(prompt.to_string())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = RetryingCompletionClient::new(Arc::new(Echo));
//!     match client.complete("hello", &[]).await {
//!         Ok(text) => println!("{}", text),
//!         Err(failure) => println!("{}", failure.user_message()),
//!     }
//! }
//! ```

pub mod cache;
pub mod completion;
pub mod error;
pub mod metrics;

// Re-export main types for convenience
pub use cache::{
    fingerprint, normalize_question, CacheConfig, CacheConfigBuilder, CacheEntry, CacheKey,
    CacheStats, CacheStore, Clock, ManualClock, SourceRef, SystemClock,
};
pub use completion::{
    ChatTurn, CompletionError, CompletionFailure, CompletionService, RetryConfig,
    RetryingCompletionClient, COMPLETION_CALL,
};
pub use error::{CacheError, Result, RetryConfigError};
pub use metrics::{CallMonitor, CallOutcome, CallSummary, MetricsSink, NoopMetrics};
