//! Passage retrieval for answer generation
//!
//! The orchestrator only sees the [`Retriever`] trait. [`PassageIndex`] is
//! the bundled implementation: a Tantivy BM25 index over manual passages.

pub mod keyword;

pub use keyword::PassageIndex;

use async_trait::async_trait;
use manualbot_core::{ChatTurn, SourceRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Characters of passage text kept in a source excerpt
pub const EXCERPT_CHARS: usize = 200;

/// A chunk of manual text with its origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    pub source_file: String,
    #[serde(default)]
    pub page: Option<u32>,
}

impl Passage {
    pub fn new(text: impl Into<String>, source_file: impl Into<String>, page: Option<u32>) -> Self {
        Self {
            text: text.into(),
            source_file: source_file.into(),
            page,
        }
    }

    /// Source reference with the first [`EXCERPT_CHARS`] characters of the text
    pub fn to_source_ref(&self) -> SourceRef {
        SourceRef::new(self.source_file.clone(), self.page, excerpt(&self.text))
    }
}

/// Truncate to [`EXCERPT_CHARS`] characters, appending `...` when cut
pub fn excerpt(text: &str) -> String {
    let mut short: String = text.chars().take(EXCERPT_CHARS).collect();
    if text.chars().count() > EXCERPT_CHARS {
        short.push_str("...");
    }
    short
}

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Index error: {0}")]
    Index(#[from] tantivy::TantivyError),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Retriever unavailable: {0}")]
    Unavailable(String),
}

/// Source of passages relevant to a question
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `k` passages in relevance order
    ///
    /// `history` lets implementations reformulate follow-up questions.
    async fn retrieve(
        &self,
        query: &str,
        history: &[ChatTurn],
        k: usize,
    ) -> Result<Vec<Passage>, RetrievalError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_keeps_short_text() {
        assert_eq!(excerpt("interface vlan 10"), "interface vlan 10");
    }

    #[test]
    fn test_excerpt_truncates_by_characters() {
        let text = "設".repeat(EXCERPT_CHARS + 1);
        let short = excerpt(&text);
        assert_eq!(short.chars().count(), EXCERPT_CHARS + 3);
        assert!(short.ends_with("..."));
    }

    #[test]
    fn test_exact_length_is_not_marked() {
        let text = "a".repeat(EXCERPT_CHARS);
        assert_eq!(excerpt(&text), text);
    }

    #[test]
    fn test_to_source_ref() {
        let passage = Passage::new("vrrp 1 priority 110", "ix2215.pdf", Some(88));
        let source = passage.to_source_ref();
        assert_eq!(source.file, "ix2215.pdf");
        assert_eq!(source.page, Some(88));
        assert_eq!(source.content, "vrrp 1 priority 110");
    }

    #[test]
    fn test_passage_page_is_optional_in_json() {
        let passage: Passage =
            serde_json::from_str(r#"{"text": "t", "source_file": "f.pdf"}"#).unwrap();
        assert_eq!(passage.page, None);
    }
}
