//! Input sanitization for prompt assembly.
//!
//! Two surfaces feed the prompt: the user's message and the knowledge
//! document. Both are untrusted bytes as far as the prompt is concerned,
//! so both get the same treatment: control characters stripped, length
//! bounded.

/// Maximum length of a user message after sanitization, in chars.
pub const MAX_USER_MESSAGE_CHARS: usize = 500;

/// Maximum length of any single string inside the knowledge document.
pub const MAX_KNOWLEDGE_STRING_CHARS: usize = 1000;

/// Fallback token when a message is empty after sanitization.
const NEUTRAL_GREETING: &str = "Olá!";

/// Clean a user message before it reaches the prompt builder.
///
/// Strips NUL, trims whitespace, and caps the length at
/// [`MAX_USER_MESSAGE_CHARS`] on a char boundary. An empty result becomes
/// a neutral greeting so the prompt never carries an empty question slot.
pub fn sanitize_user_message(input: &str) -> String {
    let cleaned: String = input.chars().filter(|c| *c != '\0').collect();
    let trimmed = cleaned.trim();

    let bounded: String = trimmed.chars().take(MAX_USER_MESSAGE_CHARS).collect();

    if bounded.is_empty() {
        NEUTRAL_GREETING.to_string()
    } else {
        bounded
    }
}

/// Clean a string value from the knowledge document.
///
/// Strips NUL and carriage returns and truncates to
/// [`MAX_KNOWLEDGE_STRING_CHARS`] chars, so a hostile or corrupted data
/// file cannot grow the prompt unbounded.
pub fn sanitize_knowledge_string(input: &str) -> String {
    input
        .chars()
        .filter(|c| *c != '\0' && *c != '\r')
        .take(MAX_KNOWLEDGE_STRING_CHARS)
        .collect()
}
