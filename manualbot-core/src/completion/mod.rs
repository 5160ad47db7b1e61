//! Language-model completion with bounded retries
//!
//! [`CompletionService`] is the seam to a hosted model. It reports failures
//! as a [`CompletionError`] kind so that [`RetryingCompletionClient`] can
//! branch on the kind: rate limits back off exponentially, transient faults
//! retry after a fixed pause, provider errors stop immediately.

pub mod config;
pub mod retry;

pub use config::RetryConfig;
pub use retry::{RetryingCompletionClient, COMPLETION_CALL};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One completed exchange in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub user: String,
    pub assistant: String,
}

impl ChatTurn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}

/// Failure kinds reported by a completion service for a single attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// The provider is throttling requests
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Non-retryable provider failure (bad request, auth, unknown model)
    #[error("provider error: {0}")]
    Provider(String),

    /// Anything else; worth another try
    #[error("transient error: {0}")]
    Transient(String),
}

/// Hosted text-generation capability
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Generate a reply to `prompt`, given the earlier turns of the conversation
    async fn generate(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, CompletionError>;
}

/// Final outcome of a logical completion call that did not succeed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionFailure {
    /// Still rate limited after the last attempt
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// Provider rejected the request; not retried
    #[error("provider error on attempt {attempt}: {cause}")]
    Provider { attempt: u32, cause: String },

    /// Transient failures on every attempt
    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

impl CompletionFailure {
    /// Message shown to the user in place of an answer
    pub fn user_message(&self) -> String {
        match self {
            CompletionFailure::RateLimited { .. } => {
                "言語モデルAPIのレート制限に達しました。しばらく待ってから再度お試しください。".to_string()
            }
            CompletionFailure::Provider { cause, .. } => {
                format!("エラーが発生しました: {}", cause)
            }
            CompletionFailure::Exhausted { .. } => {
                "回答の生成に失敗しました。ネットワーク接続とAPIキーの設定を確認し、しばらくしてから再度お試しください。".to_string()
            }
        }
    }

    /// Number of service calls made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            CompletionFailure::RateLimited { attempts } => *attempts,
            CompletionFailure::Provider { attempt, .. } => *attempt,
            CompletionFailure::Exhausted { attempts, .. } => *attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_embeds_provider_cause() {
        let failure = CompletionFailure::Provider {
            attempt: 1,
            cause: "HTTP 401: invalid api key".to_string(),
        };
        assert!(failure.user_message().contains("HTTP 401: invalid api key"));
        assert_eq!(failure.attempts(), 1);
    }

    #[test]
    fn test_user_messages_are_distinct() {
        let rate = CompletionFailure::RateLimited { attempts: 3 }.user_message();
        let exhausted = CompletionFailure::Exhausted {
            attempts: 3,
            last_error: "connection reset".to_string(),
        }
        .user_message();

        assert!(rate.contains("レート制限"));
        assert_ne!(rate, exhausted);
        assert!(!exhausted.contains("connection reset"));
    }

    #[test]
    fn test_error_display() {
        let error = CompletionError::RateLimited("HTTP 429".to_string());
        assert_eq!(error.to_string(), "rate limited: HTTP 429");

        let failure = CompletionFailure::RateLimited { attempts: 3 };
        assert_eq!(failure.to_string(), "rate limited after 3 attempts");
    }
}
