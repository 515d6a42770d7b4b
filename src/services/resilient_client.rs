//! Generation client with circuit-breaker protection.
//!
//! Text generation (batch and streaming) is gated by the shared breaker.
//! Embeddings are deliberately not gated: a failing embedding only degrades
//! search, so it neither trips nor respects the circuit.

use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::domain::errors::{ClientError, UpstreamError};
use crate::domain::ports::{ChatTurn, EmbeddingTask, GenerationRequest, LlmTransport};
use crate::services::circuit_breaker::{CircuitBreaker, CircuitStatus};

/// Text chunks of a gated stream.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ClientError>> + Send>>;

pub struct ResilientLlmClient {
    transport: Arc<dyn LlmTransport>,
    breaker: Arc<CircuitBreaker>,
}

impl ResilientLlmClient {
    pub fn new(transport: Arc<dyn LlmTransport>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { transport, breaker }
    }

    pub const fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    fn request(prompt: &str, system_instruction: Option<&str>, history: &[ChatTurn]) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.to_string(),
            system_instruction: system_instruction.map(str::to_string),
            history: history.to_vec(),
        }
    }

    /// Generate a complete response.
    #[instrument(skip_all, fields(provider = self.transport.name(), history = history.len()))]
    pub async fn generate(
        &self,
        prompt: &str,
        system_instruction: Option<&str>,
        history: &[ChatTurn],
    ) -> Result<String, ClientError> {
        let permit = self.breaker.try_acquire()?;
        let request = Self::request(prompt, system_instruction, history);

        match self.transport.generate(&request).await {
            Ok(text) => {
                permit.succeed();
                Ok(text)
            }
            Err(e) => {
                error!(error = %e, transient = e.is_transient(), "Generation failed");
                permit.fail();
                Err(e.into())
            }
        }
    }

    /// Stream a response.
    ///
    /// The circuit is consulted once, before the upstream call. Success is
    /// recorded only once a non-empty chunk has arrived and the stream ends
    /// cleanly; a stream that yields nothing is treated as neither success
    /// nor failure. Dropping the returned stream cancels the upstream call.
    #[instrument(skip_all, fields(provider = self.transport.name(), history = history.len()))]
    pub async fn generate_stream(
        &self,
        prompt: &str,
        system_instruction: Option<&str>,
        history: &[ChatTurn],
    ) -> Result<TextStream, ClientError> {
        let permit = self.breaker.try_acquire()?;
        let request = Self::request(prompt, system_instruction, history);

        let mut chunks = match self.transport.generate_stream(&request).await {
            Ok(chunks) => chunks,
            Err(e) => {
                error!(error = %e, "Failed to open generation stream");
                permit.fail();
                return Err(e.into());
            }
        };

        let stream = async_stream::stream! {
            let mut produced = false;
            while let Some(item) = chunks.next().await {
                match item {
                    Ok(chunk) if chunk.is_empty() => continue,
                    Ok(chunk) => {
                        produced = true;
                        yield Ok(chunk);
                    }
                    Err(e) => {
                        error!(error = %e, produced, "Generation stream failed");
                        permit.fail();
                        yield Err(ClientError::Upstream(e));
                        return;
                    }
                }
            }

            if produced {
                permit.succeed();
            } else {
                debug!("Generation stream ended without content");
            }
        };

        Ok(Box::pin(stream))
    }

    /// Document embedding for indexing. Not gated by the circuit.
    pub async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        self.embed(text, EmbeddingTask::RetrievalDocument).await
    }

    /// Query embedding for search. Not gated by the circuit.
    pub async fn generate_query_embedding(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        self.embed(text, EmbeddingTask::RetrievalQuery).await
    }

    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, UpstreamError> {
        let vector = self.transport.embed(text, task).await?;
        let expected = self.transport.embedding_dimension();
        if vector.len() != expected {
            return Err(UpstreamError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    pub fn circuit_status(&self) -> CircuitStatus {
        self.breaker.status()
    }

    /// Reachability probe; bypasses the circuit so it can detect recovery.
    pub async fn health_check(&self) -> bool {
        let request = GenerationRequest::new("Say 'ok' if you can hear me.");
        match self.transport.generate(&request).await {
            Ok(text) => !text.trim().is_empty(),
            Err(e) => {
                error!(error = %e, "Upstream health check failed");
                false
            }
        }
    }
}
