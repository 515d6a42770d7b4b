//! Rule-based follow-up suggestions.

const MAX_SUGGESTIONS: usize = 3;

/// Offered when a new conversation starts.
pub const STARTER_SUGGESTIONS: [&str; 3] = [
    "Help me find a job",
    "I need resume help",
    "What employers work with Employa?",
];

/// First matching category wins; matching is substring-based on the lowercased message.
const RULES: &[(&[&str], &[&str])] = &[
    (
        &["job", "work", "hire", "employ"],
        &[
            "What types of jobs match my skills?",
            "How do I explain gaps in my resume?",
        ],
    ),
    (
        &["resume", "cv"],
        &[
            "Can you help me write a cover letter?",
            "How should I format my resume?",
        ],
    ),
    (
        &["interview"],
        &[
            "What questions should I prepare for?",
            "How do I handle background check questions?",
        ],
    ),
    (
        &["recovery", "background", "record"],
        &[
            "Which employers are recovery-friendly?",
            "How do I frame my journey positively?",
        ],
    ),
];

const DEFAULT_SUGGESTIONS: &[&str] = &[
    "Tell me more about job opportunities",
    "How can Employa help me?",
];

/// Suggestions for the user's next message, at most three.
pub fn follow_up_suggestions(user_message: &str) -> Vec<String> {
    let lower = user_message.to_lowercase();
    let picked = RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map_or(DEFAULT_SUGGESTIONS, |(_, suggestions)| *suggestions);

    picked
        .iter()
        .take(MAX_SUGGESTIONS)
        .map(|s| (*s).to_string())
        .collect()
}

pub fn starter_suggestions() -> Vec<String> {
    STARTER_SUGGESTIONS.iter().map(|s| (*s).to_string()).collect()
}
