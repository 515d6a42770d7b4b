//! Server-Sent Events parsing for `streamGenerateContent?alt=sse`.
//!
//! Events are separated by a blank line; each carries one
//! `GenerateContentResponse` JSON document in its `data:` lines. Bytes are
//! buffered raw so multi-byte characters split across network chunks are
//! decoded intact.

use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, warn};

use super::types::GenerateContentResponse;
use crate::domain::errors::UpstreamError;

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Parses an SSE byte stream into response documents
pub struct SseStreamParser {
    inner: ByteStream,
    buffer: Vec<u8>,
    finished: bool,
}

impl SseStreamParser {
    /// Create a new SSE parser from a byte stream
    pub fn new(stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(stream),
            buffer: Vec::new(),
            finished: false,
        }
    }

    /// Position and length of the next event delimiter.
    fn find_delimiter(buffer: &[u8]) -> Option<(usize, usize)> {
        let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
        let crlf = buffer
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .map(|i| (i, 4));
        match (lf, crlf) {
            (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
            (a, b) => a.or(b),
        }
    }

    /// Parse one event block; `None` for comments and empty events.
    fn parse_event(block: &[u8]) -> Option<Result<GenerateContentResponse, UpstreamError>> {
        let text = match std::str::from_utf8(block) {
            Ok(text) => text,
            Err(e) => return Some(Err(UpstreamError::Stream(format!("invalid UTF-8: {e}")))),
        };

        let data: Vec<&str> = text
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|d| d.strip_prefix(' ').unwrap_or(d).trim_end_matches('\r'))
            .collect();
        if data.is_empty() {
            return None;
        }

        let payload = data.join("\n");
        if payload.trim().is_empty() || payload == "[DONE]" {
            return None;
        }

        match serde_json::from_str::<GenerateContentResponse>(&payload) {
            Ok(event) => Some(Ok(event)),
            Err(err) => {
                warn!(error = %err, "Failed to parse SSE event");
                Some(Err(UpstreamError::Json(err)))
            }
        }
    }
}

impl Stream for SseStreamParser {
    type Item = Result<GenerateContentResponse, UpstreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some((end, len)) = Self::find_delimiter(&self.buffer) {
                let block: Vec<u8> = self.buffer.drain(..end + len).take(end).collect();
                if let Some(event) = Self::parse_event(&block) {
                    return Poll::Ready(Some(event));
                }
                continue;
            }

            if self.finished {
                if self.buffer.iter().all(u8::is_ascii_whitespace) {
                    return Poll::Ready(None);
                }
                // Last event without a trailing blank line
                let block = std::mem::take(&mut self.buffer);
                debug!(bytes = block.len(), "Parsing trailing SSE event");
                return Poll::Ready(Self::parse_event(&block));
            }

            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => self.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(err))) => {
                    self.finished = true;
                    self.buffer.clear();
                    return Poll::Ready(Some(Err(UpstreamError::from(err))));
                }
                Poll::Ready(None) => self.finished = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
