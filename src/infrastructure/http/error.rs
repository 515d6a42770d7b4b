//! HTTP error mapping.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::domain::errors::ChatError;

/// Error body for every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// An API key was sent but is not recognised.
    InvalidApiKey,
    /// The route needs an API key and none was sent.
    AuthenticationRequired,
    /// The key is valid but carries no user id.
    UserIdRequired,
    Validation(String),
    Chat(ChatError),
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        Self::Chat(err)
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            Self::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "INVALID_API_KEY",
                "Invalid API key.".to_string(),
            ),
            Self::AuthenticationRequired => (
                StatusCode::UNAUTHORIZED,
                "AUTHENTICATION_REQUIRED",
                "An API key is required.".to_string(),
            ),
            Self::UserIdRequired => (
                StatusCode::BAD_REQUEST,
                "USER_ID_REQUIRED",
                "User ID required".to_string(),
            ),
            Self::Validation(detail) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_FAILED",
                detail.clone(),
            ),
            Self::Chat(err) => {
                let (status, code) = match err {
                    ChatError::CircuitOpen(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
                    ChatError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                    ChatError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    ChatError::Upstream(_) | ChatError::Persistence(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "CHAT_FAILED")
                    }
                };
                (status, code, err.user_message().to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            if let Self::Chat(err) = &self {
                error!(error = %err, code, "Request failed");
            }
        }

        let mut response = (
            status,
            Json(ErrorResponse {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response();

        if let Self::Chat(err) = &self {
            if let Some(retry_after) = err.retry_after() {
                let secs = retry_after.as_secs().max(1);
                if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
            }
        }
        response
    }
}
