//! Error types for the generation module.

use thiserror::Error;

/// Result type alias for generation operations.
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Errors that can occur during generation.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation session not found: {0}")]
    SessionNotFound(String),

    #[error("Generation failed: {0}")]
    Collaborator(String),

    #[error("Generation orchestrator is shutting down")]
    ShuttingDown,

    #[error("Generation stream ended without a result")]
    StreamEnded,

    #[error("LLM not configured. Set OPENAI_API_KEY or ANTHROPIC_API_KEY.")]
    LlmNotConfigured,

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
