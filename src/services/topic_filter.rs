//! Keyword topic policy.
//!
//! This is a denylist: it redirects a few known off-topic categories and
//! lets everything else through, tagging it `general` when no career word
//! was found. Keyword-sparse but legitimate questions are never refused.

use std::collections::HashSet;

use tracing::debug;

use crate::domain::models::{BlockReason, GuardrailResult, Severity, Topic};

/// Messages shorter than this (after trimming) are treated as greetings.
pub const GREETING_MAX_CHARS: usize = 20;

const CAREER_KEYWORDS: &[&str] = &[
    // job search
    "job", "jobs", "career", "careers", "work", "working", "employment", "employed",
    "unemployed", "hiring", "hired", "hire", "apply", "application", "applying",
    "position", "role", "opportunity", "opportunities",
    // resume
    "resume", "cv", "cover letter", "portfolio", "linkedin", "profile",
    // interview
    "interview", "interviewing", "interviews", "meeting", "call",
    // skills
    "skill", "skills", "experience", "qualification", "qualifications", "education",
    "training", "certification", "certificate", "degree",
    // workplace
    "workplace", "office", "coworker", "coworkers", "manager", "boss", "employer",
    "company", "companies", "organization", "business",
    // pay
    "salary", "pay", "wage", "wages", "compensation", "benefits", "insurance", "401k",
    "pto", "vacation",
    // development
    "promotion", "raise", "growth", "advancement", "development", "networking",
    "network", "mentor", "mentoring",
    // second-chance hiring
    "recovery", "background", "gap", "explanation", "second chance", "fair chance",
    "background check", "record", "conviction",
    // product
    "employa", "dave", "match", "matching", "score",
];

const OFF_TOPIC: &[(Topic, &[&str], &str)] = &[
    (
        Topic::Medical,
        &[
            "doctor", "hospital", "medicine", "prescription", "symptoms", "diagnosis",
            "medical", "health condition", "treatment plan",
        ],
        "I appreciate you sharing that with me. While I care about your wellbeing, \
I'm best equipped to help with career-related questions. For health concerns, \
please reach out to a healthcare professional. \
Now, is there anything I can help you with regarding your job search?",
    ),
    (
        Topic::Therapy,
        &[
            "therapist", "counselor", "depression", "anxiety", "trauma", "mental health",
            "suicidal", "self-harm",
        ],
        "Thank you for trusting me with that. I want to be honest - I'm a career coach, \
not a counselor. For personal challenges, please consider speaking with a \
mental health professional or your support network. \
In the meantime, how can I support your career goals?",
    ),
    (
        Topic::Legal,
        &[
            "lawyer", "attorney", "lawsuit", "sue", "court", "legal advice", "custody",
            "divorce",
        ],
        "That sounds like a legal matter that's beyond my expertise. \
I'd recommend consulting with a lawyer or legal aid organization. \
What I can help with is navigating the job search process. \
Is there anything career-related I can assist with?",
    ),
    (
        Topic::Coding,
        &[
            "python", "javascript", "code", "programming", "debug", "function", "api",
            "database", "algorithm",
        ],
        "While I'd love to help with coding, my specialty is career coaching and job search support. \
For programming questions, sites like Stack Overflow are great resources. \
But if you're looking for tech jobs or want to discuss your career in tech, I'm all ears!",
    ),
];

/// Generic redirect for callers that want to steer a conversation back.
pub const GENERAL_REDIRECT: &str = "That's an interesting topic! I'm most helpful with career \
and job search questions though. Is there anything about your employment journey I can help \
with today?";

/// Lowercased word tokens of a message.
struct Tokens {
    words: HashSet<String>,
    /// Tokens joined by single spaces and padded, for phrase lookups.
    joined: String,
}

impl Tokens {
    fn new(message: &str) -> Self {
        let ordered: Vec<String> = split_words(message).collect();
        let joined = format!(" {} ", ordered.join(" "));
        Self {
            words: ordered.into_iter().collect(),
            joined,
        }
    }

    /// Single words hit the word set; phrases must appear as consecutive tokens.
    fn contains(&self, keyword: &str) -> bool {
        let parts: Vec<String> = split_words(keyword).collect();
        match parts.as_slice() {
            [] => false,
            [word] => self.words.contains(word),
            _ => self.joined.contains(&format!(" {} ", parts.join(" "))),
        }
    }

    fn any(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.contains(k))
    }
}

fn split_words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Classifies messages and redirects known off-topic ones.
#[derive(Debug, Default, Clone, Copy)]
pub struct TopicFilter;

impl TopicFilter {
    pub const fn new() -> Self {
        Self
    }

    pub fn check(&self, message: &str) -> GuardrailResult {
        let tokens = Tokens::new(message);

        if tokens.any(CAREER_KEYWORDS) {
            return GuardrailResult::allowed_with_topic(Topic::Career);
        }

        if message.trim().chars().count() < GREETING_MAX_CHARS {
            return GuardrailResult::allowed_with_topic(Topic::Greeting);
        }

        for (topic, keywords, redirect) in OFF_TOPIC {
            if tokens.any(keywords) {
                debug!(topic = topic.as_str(), "Off-topic message redirected");
                return GuardrailResult::blocked(BlockReason::OffTopic, Severity::Low, *redirect)
                    .with_topic(*topic);
            }
        }

        GuardrailResult::allowed_with_topic(Topic::General)
    }
}
