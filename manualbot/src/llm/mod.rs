//! Hosted language-model providers

pub mod groq;

pub use groq::{GroqChatService, GroqSettings};
