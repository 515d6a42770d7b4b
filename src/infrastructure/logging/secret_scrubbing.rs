use regex::{Captures, Regex};
use std::fmt;

/// Redacts credentials from text before it reaches a log line or an error
/// message.
#[derive(Clone)]
pub struct SecretScrubber {
    google_key_pattern: Regex,
    bearer_pattern: Regex,
    field_pattern: Regex,
    query_pattern: Regex,
}

impl SecretScrubber {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            // Google API keys: AIza followed by 35 url-safe characters
            google_key_pattern: Regex::new(r"AIza[0-9A-Za-z_\-]{35}")?,
            bearer_pattern: Regex::new(r"Bearer\s+[a-zA-Z0-9\-_\.]+")?,
            // "api_key": "...", token=..., x-goog-api-key: ...
            field_pattern: Regex::new(
                r#"(?i)(["']?(?:x-goog-api-key|x-api-key|api_key|apikey|token|secret|password)["']?\s*[:=]\s*)["']?[^"'\s,}&]{4,}["']?"#,
            )?,
            // ?key=... in URLs
            query_pattern: Regex::new(r"([?&]key=)[^&\s]+")?,
        })
    }

    /// Scrub a message of sensitive data
    pub fn scrub(&self, message: &str) -> String {
        let scrubbed = self
            .google_key_pattern
            .replace_all(message, "[API_KEY_REDACTED]");
        let scrubbed = self
            .bearer_pattern
            .replace_all(&scrubbed, "Bearer [TOKEN_REDACTED]");
        let scrubbed = self
            .field_pattern
            .replace_all(&scrubbed, |caps: &Captures| format!("{}[REDACTED]", &caps[1]));
        self.query_pattern
            .replace_all(&scrubbed, "${1}[REDACTED]")
            .into_owned()
    }
}

impl fmt::Debug for SecretScrubber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretScrubber").finish()
    }
}
