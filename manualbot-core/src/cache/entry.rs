//! Cache entry layout and TTL checks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cache::types::CacheKey;

/// One source passage attached to an answer, in retrieval rank order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Manual file the passage came from
    pub file: String,

    /// Page number inside the manual, when known
    pub page: Option<u32>,

    /// Excerpt shown to the user
    pub content: String,
}

impl SourceRef {
    pub fn new(file: impl Into<String>, page: Option<u32>, content: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            page,
            content: content.into(),
        }
    }
}

/// A cached answer as persisted on disk
///
/// Entries are never edited in place; a new answer for the same key replaces
/// the whole file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Question as originally asked
    pub question: String,

    /// Generated answer
    pub answer: String,

    /// Sources in retrieval rank order
    pub sources: Vec<SourceRef>,

    /// Insertion time, Unix seconds
    pub timestamp: f64,

    /// Fingerprint of the normalized question; also the file stem
    pub cache_key: CacheKey,
}

impl CacheEntry {
    pub fn new(
        cache_key: CacheKey,
        question: impl Into<String>,
        answer: impl Into<String>,
        sources: Vec<SourceRef>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            sources,
            timestamp: created_at.timestamp_micros() as f64 / 1_000_000.0,
            cache_key,
        }
    }

    /// Insertion time, or `None` when the stored timestamp is unusable
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        if !self.timestamp.is_finite() || self.timestamp < 0.0 {
            return None;
        }
        DateTime::from_timestamp_millis((self.timestamp * 1000.0).round() as i64)
    }

    /// Age of the entry at `now` (zero for timestamps in the future)
    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        let created = self.created_at()?;
        Some((now - created).to_std().unwrap_or(Duration::ZERO))
    }

    /// Whether the entry is older than `ttl` at `now`
    ///
    /// Entries without a usable timestamp count as expired.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match self.age(now) {
            Some(age) => age > ttl,
            None => true,
        }
    }
}
