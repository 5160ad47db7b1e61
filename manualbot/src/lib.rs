pub mod cli;
pub mod config;
pub mod llm;
pub mod orchestrator;
pub mod retrieval;

pub use config::{AppConfig, ConfigError};
pub use llm::{GroqChatService, GroqSettings};
pub use orchestrator::{
    build_prompt, Answer, ChatError, ConversationMemory, ConversationOrchestrator,
    OrchestratorConfig,
};
pub use retrieval::{Passage, PassageIndex, RetrievalError, Retriever};
