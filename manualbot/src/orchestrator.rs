use std::sync::Arc;

use manualbot_core::{
    CacheStats, CacheStore, CallOutcome, ChatTurn, CompletionFailure, MetricsSink, NoopMetrics,
    RetryingCompletionClient, SourceRef,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::retrieval::{Passage, Retriever};

/// Metrics name for one `ask` call
pub const ASK_CALL: &str = "ask";

/// Shortest accepted question, in characters after trimming
pub const MIN_QUESTION_CHARS: usize = 3;

/// Default instructions sent with every question
pub const DEFAULT_SYSTEM_TEMPLATE: &str = "あなたはCISCOなどのネットワーク機器の技術サポート専門家です。
製品マニュアルに基づいて、技術者からの質問に正確かつ簡潔に**日本語で**回答してください。

重要な指示：
1. **必ず日本語で回答してください**
2. 提供された文書の内容に基づいて回答する
3. 技術的に正確な用語を使用する
4. 不明な点は推測せず、マニュアルに記載がないことを明確に伝える
5. 必要に応じて、関連する設定例やコマンドを含める
6. 専門用語は日本語で説明し、英語の場合は括弧内に併記する

コンテキスト:
{context}

質問: {question}

回答（日本語で）:";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("質問は{min_chars}文字以上で入力してください")]
    Validation { min_chars: usize },
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Passages requested from the retriever per question
    pub search_k: usize,
    /// Prompt template with `{context}` and `{question}` placeholders
    pub system_template: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            search_k: 4,
            system_template: DEFAULT_SYSTEM_TEMPLATE.to_string(),
        }
    }
}

/// Reply to one question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceRef>,
    pub from_cache: bool,
}

impl Answer {
    fn advisory(text: String) -> Self {
        Self {
            text,
            sources: Vec::new(),
            from_cache: false,
        }
    }
}

/// Completed turns of the current conversation
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    turns: Vec<ChatTurn>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Answers questions through cache, retrieval and the completion client
///
/// One question is fully processed before the next; `ask` takes `&mut self`
/// because a successful answer extends the conversation memory.
pub struct ConversationOrchestrator {
    retriever: Arc<dyn Retriever>,
    client: RetryingCompletionClient,
    cache: Option<Arc<CacheStore>>,
    memory: ConversationMemory,
    config: OrchestratorConfig,
    metrics: Arc<dyn MetricsSink>,
}

impl ConversationOrchestrator {
    /// `cache` is `None` when caching is disabled
    pub fn new(
        retriever: Arc<dyn Retriever>,
        client: RetryingCompletionClient,
        cache: Option<Arc<CacheStore>>,
    ) -> Self {
        Self {
            retriever,
            client,
            cache,
            memory: ConversationMemory::new(),
            config: OrchestratorConfig::default(),
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Answer a question
    ///
    /// Only validation failures are returned as `Err`. Retrieval and
    /// completion failures come back as an advisory answer with no sources;
    /// they are neither cached nor added to the conversation memory.
    pub async fn ask(&mut self, question: &str) -> Result<Answer, ChatError> {
        let started = Instant::now();
        let result = self.answer(question).await;

        let outcome = match &result {
            Ok((_, outcome)) => *outcome,
            Err(_) => CallOutcome::Rejected,
        };
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.metrics.record_call(ASK_CALL, elapsed_ms, outcome);

        result.map(|(answer, _)| answer)
    }

    async fn answer(&mut self, question: &str) -> Result<(Answer, CallOutcome), ChatError> {
        if question.trim().chars().count() < MIN_QUESTION_CHARS {
            return Err(ChatError::Validation {
                min_chars: MIN_QUESTION_CHARS,
            });
        }

        if let Some(cache) = &self.cache {
            if let Some(entry) = cache.lookup(question) {
                info!("Answer served from cache");
                let answer = Answer {
                    text: entry.answer,
                    sources: entry.sources,
                    from_cache: true,
                };
                return Ok((answer, CallOutcome::CacheHit));
            }
        }

        let passages = match self
            .retriever
            .retrieve(question, self.memory.turns(), self.config.search_k)
            .await
        {
            Ok(passages) => passages,
            Err(e) => {
                warn!("Retrieval failed: {}", e);
                let answer = Answer::advisory(format!("エラーが発生しました: {}", e));
                return Ok((answer, CallOutcome::Failed));
            }
        };
        debug!("Retrieved {} passages", passages.len());

        let prompt = build_prompt(&self.config.system_template, &passages, question);

        let text = match self.client.complete(&prompt, self.memory.turns()).await {
            Ok(text) => text,
            Err(failure) => {
                warn!("Completion failed: {}", failure);
                let outcome = match &failure {
                    CompletionFailure::RateLimited { .. } => CallOutcome::RateLimited,
                    _ => CallOutcome::Failed,
                };
                return Ok((Answer::advisory(failure.user_message()), outcome));
            }
        };

        let sources: Vec<SourceRef> = passages.iter().map(Passage::to_source_ref).collect();

        self.memory.push(ChatTurn::new(question, text.clone()));

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store(question, &text, sources.clone()) {
                warn!("Failed to cache answer: {}", e);
            }
        }

        let answer = Answer {
            text,
            sources,
            from_cache: false,
        };
        Ok((answer, CallOutcome::Success))
    }

    /// Forget the conversation; the cache is untouched
    pub fn clear_memory(&mut self) {
        self.memory.clear();
        info!("Conversation memory cleared");
    }

    /// Delete every cached answer; the conversation is untouched
    ///
    /// Returns the number of removed entries (0 when caching is disabled).
    pub fn clear_cache(&self) -> manualbot_core::Result<usize> {
        match &self.cache {
            Some(cache) => cache.clear_all(),
            None => Ok(0),
        }
    }

    /// Completed `(user, assistant)` turns, oldest first
    pub fn history(&self) -> &[ChatTurn] {
        self.memory.turns()
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Cache statistics, `None` when caching is disabled
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| cache.stats())
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }
}

/// Fill the template with rendered passages and the question
pub fn build_prompt(template: &str, passages: &[Passage], question: &str) -> String {
    fill_template(template, &render_context(passages), question)
}

fn render_context(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(|p| match p.page {
            Some(page) => format!("[{} p.{}]\n{}", p.source_file, page, p.text),
            None => format!("[{}]\n{}", p.source_file, p.text),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// Single pass, so placeholder text inside passages or the question stays literal
fn fill_template(template: &str, context: &str, question: &str) -> String {
    let mut out = String::with_capacity(template.len() + context.len() + question.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{context}") {
            out.push_str(context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{question}") {
            out.push_str(question);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}
