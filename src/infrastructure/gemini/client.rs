//! Gemini REST transport.
//!
//! Makes direct HTTP calls to the Generative Language API. Resilience
//! (circuit breaking) is layered on top by the service; this adapter only
//! maps requests, responses and errors.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client, Response};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::streaming::SseStreamParser;
use super::types::{
    ApiErrorEnvelope, Content, EmbedContentRequest, EmbedContentResponse, GenerateContentRequest,
    GenerateContentResponse, GenerationConfig,
};
use crate::domain::errors::UpstreamError;
use crate::domain::models::UpstreamConfig;
use crate::domain::ports::{ChunkStream, EmbeddingTask, GenerationRequest, LlmTransport};
use crate::infrastructure::logging::SecretScrubber;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Configuration for the Gemini transport.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub timeout: Duration,
}

impl GeminiConfig {
    /// Defaults for everything but the key.
    pub fn new(api_key: impl Into<String>) -> Self {
        let defaults = UpstreamConfig::default();
        Self::from_parts(api_key.into(), &defaults)
    }

    /// Build from the upstream config section; `None` without an API key.
    pub fn from_upstream(upstream: &UpstreamConfig) -> Option<Self> {
        upstream
            .resolved_api_key()
            .map(|key| Self::from_parts(key, upstream))
    }

    fn from_parts(api_key: String, upstream: &UpstreamConfig) -> Self {
        Self {
            api_key,
            base_url: upstream.base_url.trim_end_matches('/').to_string(),
            model: upstream.model.clone(),
            embedding_model: upstream.embedding_model.clone(),
            embedding_dimension: upstream.embedding_dimension,
            temperature: upstream.temperature,
            top_p: upstream.top_p,
            top_k: upstream.top_k,
            max_output_tokens: upstream.max_output_tokens,
            timeout: upstream.timeout(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err.without_url().to_string())
        }
    }
}

pub struct GeminiTransport {
    config: GeminiConfig,
    http: Client,
    scrubber: SecretScrubber,
}

impl GeminiTransport {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;
        let scrubber = SecretScrubber::new().context("Failed to compile secret patterns")?;

        Ok(Self {
            config,
            http,
            scrubber,
        })
    }

    pub const fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{model}:{method}", self.config.base_url)
    }

    fn build_request(&self, request: &GenerationRequest) -> GenerateContentRequest {
        let mut contents: Vec<Content> = request
            .history
            .iter()
            .map(|turn| Content::text(Some(turn.role.as_str()), turn.text.as_str()))
            .collect();
        contents.push(Content::text(Some("user"), request.prompt.as_str()));

        GenerateContentRequest {
            contents,
            system_instruction: request
                .system_instruction
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(|s| Content::text(None, s)),
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                top_k: self.config.top_k,
                max_output_tokens: self.config.max_output_tokens,
            },
        }
    }

    async fn post(&self, url: &str, body: &impl Serialize) -> Result<Response, UpstreamError> {
        let response = self
            .http
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
            .map(|envelope| envelope.error.message)
            .unwrap_or(body);
        let message = self.scrubber.scrub(&message);
        warn!(status = status.as_u16(), %message, "Gemini API returned an error");

        Err(UpstreamError::from_status(status.as_u16(), message))
    }
}

#[async_trait]
impl LlmTransport for GeminiTransport {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn embedding_dimension(&self) -> usize {
        self.config.embedding_dimension
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, UpstreamError> {
        let url = self.endpoint(&self.config.model, "generateContent");
        let response = self.post(&url, &self.build_request(request)).await?;

        let body = response.text().await?;
        let parsed: GenerateContentResponse = serde_json::from_str(&body)?;
        let text = parsed.text();
        if text.is_empty() {
            warn!(block_reason = ?parsed.block_reason(), "Gemini returned no candidate text");
            return Err(UpstreamError::EmptyResponse);
        }

        debug!(chars = text.len(), "Generation complete");
        Ok(text)
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<ChunkStream, UpstreamError> {
        let url = format!(
            "{}?alt=sse",
            self.endpoint(&self.config.model, "streamGenerateContent")
        );
        let response = self.post(&url, &self.build_request(request)).await?;

        let chunks = SseStreamParser::new(response.bytes_stream())
            .map(|event| event.map(|response| response.text()));
        Ok(Box::pin(chunks))
    }

    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, UpstreamError> {
        let url = self.endpoint(&self.config.embedding_model, "embedContent");
        let body = EmbedContentRequest {
            model: format!("models/{}", self.config.embedding_model),
            content: Content::text(None, text),
            task_type: task.as_str(),
        };

        let response = self.post(&url, &body).await?;
        let raw = response.text().await?;
        let parsed: EmbedContentResponse = serde_json::from_str(&raw)?;
        Ok(parsed.embedding.values)
    }
}
