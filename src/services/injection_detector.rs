//! Prompt-injection and jailbreak detection.
//!
//! A best-effort keyword screen, not a security boundary: it catches the
//! common phrasings of instruction overrides, persona swaps, prompt
//! extraction and format smuggling, plus payloads that are mostly
//! punctuation. A determined adversary can still phrase around it.

use regex::{Regex, RegexBuilder};
use tracing::{info, instrument};

use crate::domain::models::{BlockReason, GuardrailResult, Severity};

pub const INJECTION_MESSAGE: &str = "I'm Dave, your career coach at Employa. \
I'm here to help with your job search and career questions. \
What can I help you with today?";

pub const SUSPICIOUS_CONTENT_MESSAGE: &str = "I had trouble understanding that message. \
Could you rephrase your question about career or job search?";

/// Share of punctuation/symbol characters above which a message is suspicious.
pub const SPECIAL_CHAR_RATIO_LIMIT: f64 = 0.3;

/// Pattern group, used only for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Override,
    RolePlay,
    Extraction,
    Jailbreak,
    FormatMarker,
    Boundary,
}

impl Intent {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Override => "override",
            Self::RolePlay => "role_play",
            Self::Extraction => "extraction",
            Self::Jailbreak => "jailbreak",
            Self::FormatMarker => "format_marker",
            Self::Boundary => "boundary",
        }
    }
}

/// (intent, pattern, text that may follow a match without it counting)
const RULES: &[(Intent, &str, Option<&str>)] = &[
    (
        Intent::Override,
        r"ignore\s+(?:all\s+)?(?:your\s+)?(?:previous|above|all|prior)?\s*(?:instructions?|prompts?|rules?|guidelines?)",
        None,
    ),
    (
        Intent::Override,
        r"disregard\s+(?:the\s+)?(?:system|previous|above)\s+(?:prompt|instructions?|rules?)",
        None,
    ),
    (
        Intent::Override,
        r"forget\s+(?:everything|all|what)\s+(?:you|i)\s+(?:told|said|know)",
        None,
    ),
    (
        Intent::Override,
        r"override\s+(?:your|the)\s+(?:rules?|instructions?|restrictions?)",
        None,
    ),
    (
        Intent::Override,
        r"bypass\s+(?:your|the|all)\s+(?:restrictions?|limits?|guardrails?)",
        None,
    ),
    (Intent::RolePlay, r"you\s+are\s+now\s+", Some(r"^(?:dave|employa)")),
    (
        Intent::RolePlay,
        r"pretend\s+(?:you\s+are|to\s+be)\s+",
        Some(r"^a\s+career"),
    ),
    (
        Intent::RolePlay,
        r"act\s+as\s+(?:if\s+you\s+are|a)\s+",
        Some(r"^(?:career|job)"),
    ),
    (Intent::RolePlay, r"roleplay\s+as", None),
    (Intent::RolePlay, r"simulate\s+being", None),
    (
        Intent::Extraction,
        r"(?:what|show|reveal|display|print)\s+(?:me\s+)?(?:is|are)?\s*your\s+(?:system\s+)?prompt",
        None,
    ),
    (
        Intent::Extraction,
        r"(?:what|show|reveal)\s+(?:me\s+)?(?:are\s+)?your\s+(?:initial\s+)?instructions",
        None,
    ),
    (
        Intent::Extraction,
        r"repeat\s+(?:your|the)\s+(?:system\s+)?prompt",
        None,
    ),
    (
        Intent::Extraction,
        r"output\s+(?:your|the)\s+(?:hidden|system)\s+(?:prompt|instructions)",
        None,
    ),
    (Intent::Jailbreak, r"(?:DAN|STAN|DUDE|OMEGA)\s*mode", None),
    (Intent::Jailbreak, r"developer\s+mode", None),
    (Intent::Jailbreak, r"jailbreak", None),
    (Intent::Jailbreak, r"do\s+anything\s+now", None),
    (Intent::FormatMarker, r"new\s+instructions?:", None),
    (Intent::FormatMarker, r"<\s*/?system\s*>", None),
    (Intent::FormatMarker, r"\[system\]", None),
    (Intent::FormatMarker, r"###\s*system", None),
    (
        Intent::Boundary,
        r"(?:exit|leave|escape)\s+(?:your\s+)?(?:restrictions?|boundaries|limits)",
        None,
    ),
    (Intent::Boundary, r"break\s+(?:free|out)\s+of", None),
];

struct Rule {
    intent: Intent,
    pattern: Regex,
    exemption: Option<Regex>,
}

impl Rule {
    /// True if any occurrence is not followed by exempted text.
    fn matches(&self, message: &str) -> bool {
        self.pattern.find_iter(message).any(|m| {
            self.exemption
                .as_ref()
                .is_none_or(|exempt| !exempt.is_match(&message[m.end()..]))
        })
    }
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Screens messages for injection attempts.
pub struct InjectionDetector {
    rules: Vec<Rule>,
}

impl InjectionDetector {
    pub fn new() -> Result<Self, regex::Error> {
        let rules = RULES
            .iter()
            .map(|&(intent, pattern, exemption)| {
                Ok(Rule {
                    intent,
                    pattern: compile(pattern)?,
                    exemption: exemption.map(compile).transpose()?,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self { rules })
    }

    /// Block on any pattern hit (high), then on symbol-heavy text (medium).
    ///
    /// The user-facing message is the same for every pattern so it never
    /// reveals which rule fired.
    #[instrument(skip_all)]
    pub fn check(&self, message: &str) -> GuardrailResult {
        if let Some(rule) = self.rules.iter().find(|rule| rule.matches(message)) {
            info!(intent = rule.intent.as_str(), "Prompt injection attempt blocked");
            return GuardrailResult::blocked(
                BlockReason::PromptInjection,
                Severity::High,
                INJECTION_MESSAGE,
            );
        }

        let ratio = special_char_ratio(message);
        if ratio > SPECIAL_CHAR_RATIO_LIMIT {
            info!(ratio, "Suspicious content blocked");
            return GuardrailResult::blocked(
                BlockReason::SuspiciousContent,
                Severity::Medium,
                SUSPICIOUS_CONTENT_MESSAGE,
            );
        }

        GuardrailResult::allowed()
    }
}

/// Fraction of characters that are neither alphanumeric nor whitespace.
pub fn special_char_ratio(message: &str) -> f64 {
    let (total, special) = message.chars().fold((0_u32, 0_u32), |(total, special), c| {
        let is_special = !c.is_alphanumeric() && !c.is_whitespace();
        (total + 1, special + u32::from(is_special))
    });

    f64::from(special) / f64::from(total.max(1))
}
