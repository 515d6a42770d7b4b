//! Effective prompt text with a moka TTL cache over the prompt store.
//!
//! Only found prompts are cached. Store failures are logged and treated as
//! "not found" so callers fall back to the built-in texts.

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::models::UserType;
use crate::domain::ports::PromptStore;

pub const SYSTEM_CATEGORY: &str = "dave_system";
pub const RECOVERY_LANGUAGE_CATEGORY: &str = "recovery_language";

pub const FALLBACK_PERSONALITY: &str = "# Dave - Employa AI Career Coach

You are Dave, Employa's AI career coach. You help individuals in recovery from addiction find meaningful employment with recovery-friendly employers.

## Core Personality
- Empathetic and supportive, but practical and action-oriented
- Direct and honest, while remaining encouraging
- Professional but warm - like a trusted mentor
- Recovery-informed: you understand the journey without being clinical

## Expertise Areas
- Job search strategies for people with employment gaps
- Resume and cover letter writing that frames experience positively
- Interview preparation with a focus on addressing background honestly
- Connecting users with recovery-friendly employers
- Career development and skills assessment

## Boundaries
- You are NOT a therapist or counselor - redirect clinical questions appropriately
- You do NOT provide medical or legal advice
- You focus on career and employment topics
- You politely redirect off-topic conversations back to career support

## Communication Style
- Use clear, encouraging language
- Acknowledge challenges while emphasizing strengths
- Provide specific, actionable advice
- Celebrate wins, no matter how small
- Never use stigmatizing language about addiction or recovery";

const EMPLOYER_WELCOME: &str = "Hi! I'm Dave, Employa's AI assistant. I'm here to help you connect with motivated candidates from our recovery community. How can I assist you today?";
const TREATMENT_CENTER_WELCOME: &str = "Hello! I'm Dave from Employa. I'm here to help you connect your clients with recovery-friendly employment opportunities. What can I help you with?";
const JOB_SEEKER_WELCOME: &str = "Hey there! I'm Dave, your AI career coach at Employa. I'm here to help you navigate your job search and connect with employers who value second-chance hiring. What's on your mind today?";

const USER_TYPE_PLACEHOLDER: &str = "{{ user_type }}";

/// Welcome text used when no welcome prompt is stored.
pub const fn fallback_welcome(user_type: UserType) -> &'static str {
    match user_type {
        UserType::Employer => EMPLOYER_WELCOME,
        UserType::TreatmentCenter => TREATMENT_CENTER_WELCOME,
        UserType::JobSeeker | UserType::Anonymous => JOB_SEEKER_WELCOME,
    }
}

type CacheKey = (String, String);

pub struct PromptManager {
    store: Arc<dyn PromptStore>,
    cache: Cache<CacheKey, Arc<str>>,
}

impl PromptManager {
    pub fn new(store: Arc<dyn PromptStore>, ttl: Duration, max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self { store, cache }
    }

    /// Prompt content, served from cache while fresh.
    pub async fn get_prompt(&self, category: &str, name: &str) -> Option<String> {
        let key = (category.to_string(), name.to_string());
        if let Some(cached) = self.cache.get(&key).await {
            return Some(cached.to_string());
        }

        match self.store.get(category, name).await {
            Ok(Some(content)) => {
                self.cache.insert(key, Arc::from(content.as_str())).await;
                Some(content)
            }
            Ok(None) => {
                debug!(category, name, "Prompt not found");
                None
            }
            Err(e) => {
                warn!(category, name, error = %e, "Prompt lookup failed; using fallback");
                None
            }
        }
    }

    /// Full system instruction for a conversation with `user_type`.
    pub async fn system_prompt(&self, user_type: UserType) -> String {
        let mut parts = vec![self
            .get_prompt(SYSTEM_CATEGORY, "base_personality")
            .await
            .unwrap_or_else(|| FALLBACK_PERSONALITY.to_string())];

        let mode_name = format!("{}_mode", user_type.as_str());
        if let Some(mode) = self.get_prompt(SYSTEM_CATEGORY, &mode_name).await {
            parts.push(format!("\n\n## Context Mode: {}\n{mode}", user_type.title()));
        }

        if let Some(guidelines) = self.get_prompt(RECOVERY_LANGUAGE_CATEGORY, "guidelines").await {
            parts.push(format!("\n\n## Language Guidelines\n{guidelines}"));
        }

        if let Some(redirect) = self.get_prompt(SYSTEM_CATEGORY, "off_topic_redirect").await {
            parts.push(format!("\n\n## Off-Topic Handling\n{redirect}"));
        }

        parts.join("\n")
    }

    pub async fn welcome_message(&self, user_type: UserType) -> String {
        match self.get_prompt(SYSTEM_CATEGORY, "welcome_message").await {
            Some(welcome) => {
                welcome.replace(USER_TYPE_PLACEHOLDER, &user_type.as_str().replace('_', " "))
            }
            None => fallback_welcome(user_type).to_string(),
        }
    }

    /// Drop one entry, a whole category, or everything.
    pub async fn clear_cache(&self, category: Option<&str>, name: Option<&str>) {
        match (category, name) {
            (Some(category), Some(name)) => {
                self.cache
                    .invalidate(&(category.to_string(), name.to_string()))
                    .await;
            }
            (Some(category), None) => {
                let keys: Vec<Arc<CacheKey>> = self
                    .cache
                    .iter()
                    .filter(|(key, _)| key.0 == category)
                    .map(|(key, _)| key)
                    .collect();
                for key in keys {
                    self.cache.invalidate(key.as_ref()).await;
                }
            }
            _ => self.cache.invalidate_all(),
        }
    }
}
