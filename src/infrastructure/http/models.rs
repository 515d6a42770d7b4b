//! Request and response bodies of the HTTP surface.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::domain::models::{ChatReply, ConversationSummary, Resource};
use crate::services::CircuitStatus;

use super::error::ApiError;

pub const MAX_MESSAGE_CHARS: usize = 10_000;

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 100;

/// Reject empty or oversized messages.
pub fn validate_message(message: &str) -> Result<(), ApiError> {
    let chars = message.chars().count();
    if chars == 0 {
        return Err(ApiError::Validation("message must not be empty".to_string()));
    }
    if chars > MAX_MESSAGE_CHARS {
        return Err(ApiError::Validation(format!(
            "message must be at most {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(())
}

/// Body of `POST /api/v1/chat/message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub conversation_id: String,
    pub message_id: String,
    pub response: String,
    pub resources: Vec<Resource>,
    pub follow_up_suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl From<ChatReply> for MessageResponse {
    fn from(reply: ChatReply) -> Self {
        match reply {
            ChatReply::Answered(answer) => Self {
                conversation_id: answer.conversation_id,
                message_id: answer.message_id,
                response: answer.response,
                resources: answer.resources,
                follow_up_suggestions: answer.follow_up_suggestions,
                metadata: Some(json!({ "response_time_ms": answer.response_time_ms })),
            },
            ChatReply::Blocked { response, .. } => Self {
                conversation_id: "blocked".to_string(),
                message_id: "blocked".to_string(),
                response,
                resources: Vec::new(),
                follow_up_suggestions: Vec::new(),
                metadata: None,
            },
        }
    }
}

/// Query of `GET /api/v1/chat/stream`.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub message: String,
    pub conversation_id: Option<String>,
    pub user_type: Option<String>,
}

/// Query of `POST /api/v1/chat/start`.
#[derive(Debug, Default, Deserialize)]
pub struct StartQuery {
    pub user_type: Option<String>,
}

/// Query of `GET /api/v1/chat/conversations`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

impl ListQuery {
    /// Requested page size, 1..=100, defaulting to 50.
    pub fn validated_limit(&self) -> Result<usize, ApiError> {
        match self.limit {
            None => Ok(DEFAULT_LIST_LIMIT),
            Some(limit) if (1..=MAX_LIST_LIMIT).contains(&limit) => Ok(limit),
            Some(_) => Err(ApiError::Validation(format!(
                "limit must be between 1 and {MAX_LIST_LIMIT}"
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationList {
    pub conversations: Vec<ConversationSummary>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ArchiveResponse {
    pub status: String,
    pub conversation_id: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub circuit: CircuitStatus,
    pub rate_limiter: String,
    pub distributed_rate_limiting: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: BTreeMap<String, String>,
}
