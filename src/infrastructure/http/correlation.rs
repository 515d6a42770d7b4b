//! Correlation ids: reuse one from upstream or mint a UUID, echo it back.

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::Span;
use uuid::Uuid;

pub const CORRELATION_ID_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

/// Other headers an upstream proxy may have put the id in, by preference.
const INHERITED_HEADERS: [&str; 2] = ["x-request-id", "x-trace-id"];

/// Only consulted when `X-Correlation-ID` is absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationId;

impl MakeRequestId for CorrelationId {
    fn make_request_id<B>(&mut self, request: &axum::http::Request<B>) -> Option<RequestId> {
        let inherited = INHERITED_HEADERS
            .iter()
            .filter_map(|name| request.headers().get(*name))
            .find(|value| !value.is_empty())
            .cloned();
        let value = match inherited {
            Some(value) => value,
            None => HeaderValue::from_str(&Uuid::new_v4().to_string()).ok()?,
        };
        Some(RequestId::new(value))
    }
}

/// Request span carrying the correlation id.
pub fn request_span(request: &Request) -> Span {
    let correlation_id = request
        .headers()
        .get(&CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-");
    tracing::info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        correlation_id,
    )
}
