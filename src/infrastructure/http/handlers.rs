//! Route handlers.

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::http::StatusCode;
use axum::Json;
use futures::stream::{self, Stream};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::models::{
    ChatRequest, ConversationDetail, ConversationStart, StreamEvent, UsageStats, UserContext,
    UserType,
};
use crate::services::CircuitState;

use super::auth::AuthenticatedCaller;
use super::error::ApiError;
use super::extract::{ValidJson, ValidQuery};
use super::models::{
    validate_message, ArchiveResponse, ConversationList, HealthResponse, ListQuery,
    MessageResponse, ReadinessResponse, StartQuery, StreamQuery,
};
use super::state::AppState;

const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Audience for a request: the key's registration wins over the client's claim.
fn effective_user_type(auth: &AuthenticatedCaller, requested: Option<&str>) -> UserType {
    auth.user_type
        .or_else(|| requested.map(UserType::from_name))
        .unwrap_or_default()
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let circuit = state.chat.client().circuit_status();
    let status = match circuit.state {
        CircuitState::Closed => "healthy",
        CircuitState::Open | CircuitState::HalfOpen => "degraded",
    };

    Json(HealthResponse {
        status: status.to_string(),
        service: "dave".to_string(),
        circuit,
        rate_limiter: state.limiter.backend_name().to_string(),
        distributed_rate_limiting: state.limiter.is_distributed(),
    })
}

pub async fn liveness() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "alive" }))
}

/// Readiness: the generation API must answer.
pub async fn readiness(State(state): State<Arc<AppState>>) -> Response {
    let upstream_ok = state.chat.client().health_check().await;

    let mut checks = BTreeMap::new();
    checks.insert(
        "upstream".to_string(),
        if upstream_ok { "ok" } else { "unreachable" }.to_string(),
    );
    checks.insert(
        "rate_limiter".to_string(),
        state.limiter.backend_name().to_string(),
    );

    let (status, label) = if upstream_ok {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };
    (
        status,
        Json(ReadinessResponse {
            status: label.to_string(),
            checks,
        }),
    )
        .into_response()
}

pub async fn send_message(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedCaller,
    ValidJson(mut request): ValidJson<ChatRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_message(&request.message)?;
    if let Some(conversation_id) = request.conversation_id.as_deref() {
        state.chat.authorize(&auth.caller, conversation_id).await?;
    }

    // Identity comes from authentication only.
    request.context.user_id = auth.caller.user_id().map(str::to_string);
    if let Some(user_type) = auth.user_type {
        request.context.user_type = user_type;
    }

    let reply = state.chat.send_message(&auth.caller, &request).await?;
    Ok(Json(MessageResponse::from(reply)))
}

fn to_sse(event: &StreamEvent) -> Event {
    Event::default()
        .event(event.event_name())
        .data(event.data().to_string())
}

pub async fn stream_message(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedCaller,
    ValidQuery(query): ValidQuery<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    validate_message(&query.message)?;
    if let Some(conversation_id) = query.conversation_id.as_deref() {
        state.chat.authorize(&auth.caller, conversation_id).await?;
    }

    let context = UserContext {
        user_type: effective_user_type(&auth, query.user_type.as_deref()),
        user_id: auth.caller.user_id().map(str::to_string),
        ..UserContext::default()
    };
    let mut request = ChatRequest::new(query.message).with_context(context);
    request.conversation_id = query.conversation_id;

    let receiver = state.chat.stream_message(auth.caller, request);
    // The receiver is dropped with the response body, which stops generation.
    let events = stream::unfold(receiver, |mut rx| async move {
        rx.recv().await.map(|event| (Ok(to_sse(&event)), rx))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE)))
}

pub async fn start_conversation(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedCaller,
    ValidQuery(query): ValidQuery<StartQuery>,
) -> Result<Json<ConversationStart>, ApiError> {
    let context = UserContext {
        user_type: effective_user_type(&auth, query.user_type.as_deref()),
        user_id: auth.caller.user_id().map(str::to_string),
        ..UserContext::default()
    };
    let start = state.chat.start_conversation(&auth.caller, context).await?;
    Ok(Json(start))
}

/// The caller's current quota usage.
pub async fn usage(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedCaller,
) -> Json<UsageStats> {
    let identity = auth.caller.identity.identity();
    Json(state.limiter.usage(&identity, auth.caller.tier).await)
}

/// Conversation routes need a key; anonymous callers have nothing to list.
fn require_key(auth: &AuthenticatedCaller) -> Result<(), ApiError> {
    if auth.user_type.is_some() {
        Ok(())
    } else {
        Err(ApiError::AuthenticationRequired)
    }
}

pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedCaller,
    ValidQuery(query): ValidQuery<ListQuery>,
) -> Result<Json<ConversationList>, ApiError> {
    require_key(&auth)?;
    let owner = auth.caller.user_id().ok_or(ApiError::UserIdRequired)?;
    let limit = query.validated_limit()?;

    let conversations = state.chat.list_conversations(owner, limit).await?;
    Ok(Json(ConversationList {
        total: conversations.len(),
        conversations,
    }))
}

pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedCaller,
    Path(conversation_id): Path<String>,
) -> Result<Json<ConversationDetail>, ApiError> {
    require_key(&auth)?;
    let detail = state
        .chat
        .conversation_detail(&auth.caller, &conversation_id)
        .await?;
    Ok(Json(detail))
}

/// Archive (soft-delete) a conversation.
pub async fn archive_conversation(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedCaller,
    Path(conversation_id): Path<String>,
) -> Result<Json<ArchiveResponse>, ApiError> {
    require_key(&auth)?;
    state
        .chat
        .archive_conversation(&auth.caller, &conversation_id)
        .await?;
    Ok(Json(ArchiveResponse {
        status: "archived".to_string(),
        conversation_id,
    }))
}
