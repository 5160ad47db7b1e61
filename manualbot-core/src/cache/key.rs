//! Question fingerprints
//!
//! Cache keys are derived from the question text only: the text is trimmed,
//! lower-cased and hashed with SHA-256. Questions that differ only in case or
//! surrounding whitespace share a key.

use sha2::{Digest, Sha256};

use crate::cache::types::CacheKey;

/// Normalize a question for keying (trim, then Unicode lower-case)
pub fn normalize_question(question: &str) -> String {
    question.trim().to_lowercase()
}

/// Fixed-width (64 hex chars) fingerprint of the normalized question
pub fn fingerprint(question: &str) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(normalize_question(question).as_bytes());
    hex::encode(hasher.finalize())
}
