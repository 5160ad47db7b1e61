//! Groq chat completion service (OpenAI-compatible `/chat/completions`)

use std::time::Duration;

use async_trait::async_trait;
use manualbot_core::{ChatTurn, CompletionError, CompletionService};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama3-70b-8192";

/// Settings for [`GroqChatService`]
#[derive(Debug, Clone)]
pub struct GroqSettings {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub base_url: String,
    pub timeout: Duration,
}

impl GroqSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.3,
            max_tokens: 2048,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// [`CompletionService`] backed by the Groq API
///
/// Earlier turns are sent as alternating user/assistant messages ahead of
/// the prompt. HTTP failures are classified for the retry loop:
/// 429 is a rate limit, other 4xx are provider errors, and 5xx or transport
/// failures are transient.
#[derive(Debug, Clone)]
pub struct GroqChatService {
    client: Client,
    settings: GroqSettings,
    endpoint: String,
}

impl GroqChatService {
    pub fn new(settings: GroqSettings) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| CompletionError::Provider(format!("failed to build HTTP client: {e}")))?;
        let endpoint = format!("{}/chat/completions", settings.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            settings,
            endpoint,
        })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn build_request(&self, prompt: &str, history: &[ChatTurn]) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(history.len() * 2 + 1);
        for turn in history {
            messages.push(Message::new("user", &turn.user));
            messages.push(Message::new("assistant", &turn.assistant));
        }
        messages.push(Message::new("user", prompt));

        ChatCompletionRequest {
            model: self.settings.model.clone(),
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        }
    }
}

#[async_trait]
impl CompletionService for GroqChatService {
    async fn generate(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, CompletionError> {
        let payload = self.build_request(prompt, history);

        debug!(
            model = %payload.model,
            messages = payload.messages.len(),
            prompt_len = prompt.len(),
            "sending completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.settings.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.endpoint, error = %e, "completion request failed (transport)");
                CompletionError::Transient(e.to_string())
            })?;

        let response = check_status(response).await?;

        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize completion response");
            CompletionError::Transient(format!("failed to parse response body: {e}"))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CompletionError::Provider("empty or missing content in response".into()))
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

impl Message {
    fn new(role: &'static str, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// Error envelope used by OpenAI-compatible APIs
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Return the response if successful, or a classified error
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CompletionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => format!("HTTP {status}: {}", envelope.error.message),
        Err(_) => format!("HTTP {status}: {body}"),
    };

    error!(%status, %message, "completion request returned HTTP error");
    Err(classify_status(status, message))
}

fn classify_status(status: StatusCode, message: String) -> CompletionError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        CompletionError::RateLimited(message)
    } else if status.is_client_error() {
        CompletionError::Provider(message)
    } else {
        CompletionError::Transient(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> GroqChatService {
        GroqChatService::new(GroqSettings::new("test-key")).unwrap()
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down".into()),
            CompletionError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "bad key".into()),
            CompletionError::Provider(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "bad request".into()),
            CompletionError::Provider(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, "down".into()),
            CompletionError::Transient(_)
        ));
    }

    #[test]
    fn test_history_precedes_prompt() {
        let history = vec![ChatTurn::new("VRRPとは？", "冗長化プロトコルです。")];
        let request = service().build_request("設定例は？", &history);

        let roles: Vec<&str> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["user", "assistant", "user"]);
        assert_eq!(request.messages[2].content, "設定例は？");
        assert_eq!(request.model, DEFAULT_MODEL);
        assert_eq!(request.max_tokens, 2048);
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let service =
            GroqChatService::new(GroqSettings::new("k").with_base_url("http://localhost:8080/v1/"))
                .unwrap();
        assert_eq!(service.endpoint, "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_parses_response_shape() {
        let parsed: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": " answer "}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some(" answer "));
    }
}
