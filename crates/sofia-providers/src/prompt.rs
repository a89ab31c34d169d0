//! Prompt assembly: persona + knowledge document + sanitized user message.

use sha2::{Digest, Sha256};
use sofia_core::sanitize::sanitize_user_message;

/// Fixed persona and instructions. A design constant — never built from
/// user input.
const PERSONA: &str = "Você é a SofIA, assistente virtual da loja Dinâmica Sports (Mossoró/RN). \
Sua persona é entusiasta, prestativa e focada em direcionar a venda para o site. \
Use EXCLUSIVAMENTE o CONHECIMENTO abaixo para responder sobre produtos, preços e horários. \
Sempre que possível, inclua o link de compra e reforce que o cliente pode comprar no site.";

/// Compose the full prompt sent to the model.
///
/// The user message is sanitized and bounded before it enters the prompt;
/// the knowledge document arrives already sanitized by its store.
pub fn build(user_message: &str, knowledge: &str) -> String {
    let question = sanitize_user_message(user_message);
    format!(
        "{PERSONA}\n\nCONHECIMENTO DA LOJA (JSON): {knowledge}\n\nPergunta do Cliente: '{question}'"
    )
}

/// Stable content digest of a prompt, used as the response-cache key.
///
/// Pure function of the prompt bytes: identical prompts hash identically
/// across runs and processes.
pub fn hash(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hex::encode(hasher.finalize())
}
