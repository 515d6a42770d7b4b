//! Generation API port.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::domain::errors::UpstreamError;

/// Speaker of a history turn, in the generation API's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Model,
}

impl TurnRole {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// One prior turn sent as context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            text: text.into(),
        }
    }
}

/// A single generation call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_instruction: Option<String>,
    pub history: Vec<ChatTurn>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    #[must_use]
    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }
}

/// Embedding purpose; providers may embed documents and queries differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
    RetrievalDocument,
    RetrievalQuery,
}

impl EmbeddingTask {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RetrievalDocument => "RETRIEVAL_DOCUMENT",
            Self::RetrievalQuery => "RETRIEVAL_QUERY",
        }
    }
}

/// Text chunks in generation order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, UpstreamError>> + Send>>;

/// Raw access to a hosted generation API, without resilience policy.
#[async_trait]
pub trait LlmTransport: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &'static str;

    /// Length of vectors returned by [`embed`](Self::embed).
    fn embedding_dimension(&self) -> usize;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, UpstreamError>;

    /// Open a streaming generation. Errors before the first chunk are
    /// returned directly; later ones arrive as stream items.
    async fn generate_stream(&self, request: &GenerationRequest)
        -> Result<ChunkStream, UpstreamError>;

    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, UpstreamError>;
}
