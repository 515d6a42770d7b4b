//! In-memory collaborators for development and tests.

pub mod conversation_store;
pub mod knowledge_base;
pub mod prompt_store;

pub use conversation_store::InMemoryConversationStore;
pub use knowledge_base::{InMemoryKnowledgeBase, KnowledgeDocument};
pub use prompt_store::InMemoryPromptStore;
