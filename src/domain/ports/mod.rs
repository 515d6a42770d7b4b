//! Ports (trait seams) between the services and their adapters.

pub mod clock;
pub mod conversation_store;
pub mod knowledge_provider;
pub mod llm_transport;
pub mod prompt_store;
pub mod usage_backend;

pub use clock::Clock;
pub use conversation_store::ConversationStore;
pub use knowledge_provider::KnowledgeProvider;
pub use llm_transport::{
    ChatTurn, ChunkStream, EmbeddingTask, GenerationRequest, LlmTransport, TurnRole,
};
pub use prompt_store::PromptStore;
pub use usage_backend::UsageBackend;
