//! Common test utilities for integration tests
//!
//! Provides a scripted generation transport and a fully wired gateway
//! (guardrails, breaker, in-memory stores) driven by a mock clock.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dave::domain::errors::UpstreamError;
use dave::domain::models::{ApiKeyConfig, Config, Tier, UserType};
use dave::domain::ports::{
    ChunkStream, ConversationStore, EmbeddingTask, GenerationRequest, LlmTransport,
};
use dave::infrastructure::clock::MockClock;
use dave::infrastructure::http::{build_router, AppState};
use dave::infrastructure::memory::{
    InMemoryConversationStore, InMemoryKnowledgeBase, InMemoryPromptStore, KnowledgeDocument,
};
use dave::infrastructure::setup::{build_state, Collaborators};
use dave::infrastructure::usage::InMemoryUsageBackend;

pub const ADMIN_KEY: &str = "admin-test-key";
pub const BASIC_KEY: &str = "basic-test-key";

/// What the transport does on its next call.
#[derive(Debug, Clone)]
pub enum Outcome {
    Reply(Vec<String>),
    /// Fail with the given HTTP status.
    Fail(u16),
}

/// Transport that plays back scripted outcomes, then a default reply.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Outcome>>,
    default_reply: Vec<String>,
    calls: AtomicUsize,
    last_request: Mutex<Option<GenerationRequest>>,
}

impl ScriptedTransport {
    pub fn new(default_reply: &[&str]) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_reply: default_reply.iter().map(|s| (*s).to_string()).collect(),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn push(&self, outcome: Outcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn fail_times(&self, status: u16, times: usize) {
        for _ in 0..times {
            self.push(Outcome::Fail(status));
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.last_request.lock().unwrap().clone()
    }

    fn next(&self, request: &GenerationRequest) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Outcome::Reply(self.default_reply.clone()))
    }
}

#[async_trait]
impl LlmTransport for ScriptedTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn embedding_dimension(&self) -> usize {
        3
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, UpstreamError> {
        match self.next(request) {
            Outcome::Reply(chunks) => Ok(chunks.concat()),
            Outcome::Fail(status) => Err(UpstreamError::from_status(status, "scripted failure")),
        }
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<ChunkStream, UpstreamError> {
        match self.next(request) {
            Outcome::Reply(chunks) => {
                let items: Vec<Result<String, UpstreamError>> = chunks.into_iter().map(Ok).collect();
                Ok(Box::pin(futures::stream::iter(items)))
            }
            Outcome::Fail(status) => Err(UpstreamError::from_status(status, "scripted failure")),
        }
    }

    async fn embed(&self, _text: &str, _task: EmbeddingTask) -> Result<Vec<f32>, UpstreamError> {
        Ok(vec![0.1, 0.2, 0.3])
    }
}

/// A wired gateway plus handles to its fakes.
pub struct TestApp {
    pub state: Arc<AppState>,
    pub clock: MockClock,
    pub transport: Arc<ScriptedTransport>,
    pub conversations: Arc<InMemoryConversationStore>,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.upstream.api_key = Some("test-upstream-key".to_string());
    config.api_keys = vec![
        ApiKeyConfig {
            key: ADMIN_KEY.to_string(),
            user_id: Some("admin-1".to_string()),
            tier: Tier::Admin,
            user_type: UserType::JobSeeker,
        },
        ApiKeyConfig {
            key: BASIC_KEY.to_string(),
            user_id: Some("employer-1".to_string()),
            tier: Tier::Basic,
            user_type: UserType::Employer,
        },
    ];
    config
}

pub fn knowledge() -> InMemoryKnowledgeBase {
    InMemoryKnowledgeBase::with_documents(vec![KnowledgeDocument::article(
        "kb-gaps",
        "Explaining resume gaps",
        "Employers appreciate honest, brief explanations of resume gaps during recovery.",
    )
    .with_url("https://example.org/gaps")])
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let clock = MockClock::default();
        let transport = Arc::new(ScriptedTransport::new(&["Happy ", "to help!"]));
        let conversations = Arc::new(InMemoryConversationStore::new());
        let backend = Arc::new(InMemoryUsageBackend::new(
            Arc::new(clock.clone()),
            Duration::from_secs(300),
        ));

        let collaborators = Collaborators {
            conversations: Arc::clone(&conversations) as Arc<dyn ConversationStore>,
            prompts: Arc::new(InMemoryPromptStore::new()),
            knowledge: Arc::new(knowledge()),
        };

        let state = build_state(
            &config,
            Arc::clone(&transport) as Arc<dyn LlmTransport>,
            backend,
            collaborators,
            Arc::new(clock.clone()),
        )
        .expect("gateway wiring");

        Self {
            state,
            clock,
            transport,
            conversations,
        }
    }

    pub fn router(&self) -> Router {
        build_router(Arc::clone(&self.state), Duration::from_secs(30))
    }
}

pub fn post_json(uri: &str, body: &Value, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri).header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get(uri: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn delete(uri: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::delete(uri);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

/// Split an SSE body into `(event, data)` pairs, skipping keep-alive comments.
pub fn parse_sse(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut data = Vec::new();
            for line in block.lines() {
                if let Some(name) = line.strip_prefix("event:") {
                    event = Some(name.trim().to_string());
                } else if let Some(payload) = line.strip_prefix("data:") {
                    data.push(payload.strip_prefix(' ').unwrap_or(payload).to_string());
                }
            }
            let event = event?;
            let data = serde_json::from_str(&data.join("\n")).ok()?;
            Some((event, data))
        })
        .collect()
}

/// URL-encode a query value.
pub fn encode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{b:02X}"),
        })
        .collect()
}
