//! Generation collaborator contract.

use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, GenerationResult};

/// One element of a generation stream.
///
/// Streaming yields zero or more `Chunk`s followed by exactly one terminal
/// `Complete` or `Error`. A `Cached` element replaces the whole sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GenerationEvent {
    Chunk { content: String },
    Complete { content: String },
    Cached { content: String },
    Error { error: String },
}

impl GenerationEvent {
    pub fn chunk(content: impl Into<String>) -> Self {
        Self::Chunk {
            content: content.into(),
        }
    }

    pub fn complete(content: impl Into<String>) -> Self {
        Self::Complete {
            content: content.into(),
        }
    }

    pub fn cached(content: impl Into<String>) -> Self {
        Self::Cached {
            content: content.into(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Chunk { .. })
    }
}

/// Lazily produced generation output.
pub type GenerationStream = BoxStream<'static, GenerationEvent>;

/// Produces text for a prompt.
pub trait GenerationClient: Send + Sync {
    /// Start a generation. Failures arrive as an `Error` element, never as a
    /// panic or a missing stream.
    fn generate(
        &self,
        prompt: &str,
        context: &serde_json::Value,
        streaming: bool,
    ) -> GenerationStream;
}

/// Fold a generation stream into a single artifact.
pub async fn collect_artifact(mut stream: GenerationStream) -> GenerationResult<String> {
    let mut accumulated = String::new();
    while let Some(event) = stream.next().await {
        match event {
            GenerationEvent::Chunk { content } => accumulated.push_str(&content),
            GenerationEvent::Complete { content } => {
                return Ok(if content.is_empty() { accumulated } else { content });
            }
            GenerationEvent::Cached { content } => return Ok(content),
            GenerationEvent::Error { error } => return Err(GenerationError::Collaborator(error)),
        }
    }
    Err(GenerationError::StreamEnded)
}
