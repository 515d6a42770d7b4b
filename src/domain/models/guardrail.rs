//! Guardrail verdicts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How serious a block is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Machine-readable cause of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    RateLimitMinute,
    RateLimitDay,
    TokenLimitMinute,
    PromptInjection,
    SuspiciousContent,
    OffTopic,
}

impl BlockReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimitMinute => "rate_limit_minute",
            Self::RateLimitDay => "rate_limit_day",
            Self::TokenLimitMinute => "token_limit_minute",
            Self::PromptInjection => "prompt_injection",
            Self::SuspiciousContent => "suspicious_content",
            Self::OffTopic => "off_topic",
        }
    }

    pub const fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            Self::RateLimitMinute | Self::RateLimitDay | Self::TokenLimitMinute
        )
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Topic classification produced by the topic filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Career,
    Greeting,
    General,
    Medical,
    Therapy,
    Legal,
    Coding,
}

impl Topic {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Career => "career",
            Self::Greeting => "greeting",
            Self::General => "general",
            Self::Medical => "medical",
            Self::Therapy => "therapy",
            Self::Legal => "legal",
            Self::Coding => "coding",
        }
    }
}

/// Details of a blocked message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailBlock {
    pub reason: BlockReason,
    pub severity: Severity,
    /// Friendly text that is safe to show the user verbatim.
    pub user_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_topic: Option<Topic>,
}

/// Outcome of a guardrail check.
///
/// A blocked result always carries a reason and a user-facing message, so
/// callers never have to deal with a half-populated verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GuardrailResult {
    Allowed {
        #[serde(skip_serializing_if = "Option::is_none")]
        detected_topic: Option<Topic>,
    },
    Blocked(GuardrailBlock),
}

impl GuardrailResult {
    pub const fn allowed() -> Self {
        Self::Allowed {
            detected_topic: None,
        }
    }

    pub const fn allowed_with_topic(topic: Topic) -> Self {
        Self::Allowed {
            detected_topic: Some(topic),
        }
    }

    pub fn blocked(reason: BlockReason, severity: Severity, user_message: impl Into<String>) -> Self {
        Self::Blocked(GuardrailBlock {
            reason,
            severity,
            user_message: user_message.into(),
            detected_topic: None,
        })
    }

    #[must_use]
    pub fn with_topic(self, topic: Topic) -> Self {
        match self {
            Self::Allowed { .. } => Self::allowed_with_topic(topic),
            Self::Blocked(mut block) => {
                block.detected_topic = Some(topic);
                Self::Blocked(block)
            }
        }
    }

    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    pub const fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }

    pub const fn block(&self) -> Option<&GuardrailBlock> {
        match self {
            Self::Blocked(block) => Some(block),
            Self::Allowed { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<BlockReason> {
        self.block().map(|b| b.reason)
    }

    pub fn severity(&self) -> Option<Severity> {
        self.block().map(|b| b.severity)
    }

    pub fn user_message(&self) -> Option<&str> {
        self.block().map(|b| b.user_message.as_str())
    }

    pub const fn detected_topic(&self) -> Option<Topic> {
        match self {
            Self::Allowed { detected_topic } => *detected_topic,
            Self::Blocked(block) => block.detected_topic,
        }
    }
}
