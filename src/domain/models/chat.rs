//! Conversation and chat-exchange models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::guardrail::BlockReason;
use super::identity::IdentityParts;
use super::tier::Tier;

/// Author of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// Audience the assistant is talking to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    #[default]
    JobSeeker,
    Employer,
    TreatmentCenter,
    Anonymous,
}

impl UserType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::JobSeeker => "job_seeker",
            Self::Employer => "employer",
            Self::TreatmentCenter => "treatment_center",
            Self::Anonymous => "anonymous",
        }
    }

    /// Human form, e.g. `Treatment Center`.
    pub fn title(&self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                chars.next().map_or_else(String::new, |first| {
                    first.to_uppercase().chain(chars).collect()
                })
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Lenient parse used for query parameters; unknown values mean job seeker.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "employer" => Self::Employer,
            "treatment_center" => Self::TreatmentCenter,
            "anonymous" => Self::Anonymous,
            _ => Self::JobSeeker,
        }
    }
}

/// Context the client sends along with a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserContext {
    pub user_type: UserType,
    pub user_id: Option<String>,
    pub recovery_stage: Option<String>,
    pub preferred_tone: Option<String>,
}

impl UserContext {
    pub fn for_user_type(user_type: UserType) -> Self {
        Self {
            user_type,
            ..Self::default()
        }
    }
}

/// Knowledge resource surfaced next to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

/// Lifecycle of a conversation. Archiving is a soft delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Active,
    Archived,
}

impl ConversationStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

/// Persisted conversation header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub owner: Option<String>,
    pub context: UserContext,
    #[serde(default)]
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Who is asking, as resolved at the edge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub identity: IdentityParts,
    pub tier: Tier,
}

impl Caller {
    pub const fn new(identity: IdentityParts, tier: Tier) -> Self {
        Self { identity, tier }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.identity.user_id.as_deref()
    }
}

/// Inbound chat message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub context: UserContext,
    #[serde(default = "default_include_resources")]
    pub include_resources: bool,
}

const fn default_include_resources() -> bool {
    true
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            conversation_id: None,
            context: UserContext::default(),
            include_resources: true,
        }
    }

    #[must_use]
    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: UserContext) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub const fn without_resources(mut self) -> Self {
        self.include_resources = false;
        self
    }
}

/// Successful batch exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub conversation_id: String,
    pub message_id: String,
    pub response: String,
    pub resources: Vec<Resource>,
    pub follow_up_suggestions: Vec<String>,
    pub response_time_ms: u64,
}

/// Result of a batch send.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatReply {
    Answered(ChatAnswer),
    Blocked {
        reason: BlockReason,
        response: String,
    },
}

/// Result of starting a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationStart {
    pub conversation_id: String,
    pub message: String,
    pub suggestions: Vec<String>,
}

/// Listing entry for a caller's conversations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub message_count: usize,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A conversation with its full transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub id: String,
    pub status: ConversationStatus,
    pub messages: Vec<StoredMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One event of a streamed answer.
///
/// A stream is `Resource? Token* Suggestion? (Done | Error)`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Resource(Vec<Resource>),
    Token(String),
    Suggestion(Vec<String>),
    Done {
        conversation_id: String,
        full_response: String,
    },
    Error {
        message: String,
        reason: Option<BlockReason>,
    },
}

impl StreamEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            reason: None,
        }
    }

    /// SSE event name.
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Resource(_) => "resource",
            Self::Token(_) => "token",
            Self::Suggestion(_) => "suggestion",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// JSON payload carried in the SSE `data` field.
    pub fn data(&self) -> Value {
        match self {
            Self::Resource(resources) => json!({ "resources": resources }),
            Self::Token(content) => json!({ "content": content }),
            Self::Suggestion(suggestions) => json!({ "suggestions": suggestions }),
            Self::Done {
                conversation_id,
                full_response,
            } => json!({
                "conversation_id": conversation_id,
                "full_response": full_response,
            }),
            Self::Error { message, reason } => match reason {
                Some(reason) => json!({ "message": message, "reason": reason.as_str() }),
                None => json!({ "message": message }),
            },
        }
    }
}
