use sofia_core::sanitize::sanitize_knowledge_string;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{error, info};

/// Document served when the knowledge file is missing or invalid.
///
/// The worker keeps answering, constrained to "I don't have that
/// information", instead of crashing on a bad data file.
const SENTINEL_DOCUMENT: &str = r#"{
  "aviso": "Base de conhecimento indisponível no momento. Informe ao cliente que você não possui essa informação agora e indique o contato da loja."
}"#;

/// The store knowledge document: loaded once per worker process,
/// sanitized, and exposed as an immutable formatted JSON string.
///
/// Read-mostly shared state. The only write path is [`reload`], an
/// explicit operator action.
///
/// [`reload`]: KnowledgeStore::reload
pub struct KnowledgeStore {
    path: PathBuf,
    formatted: RwLock<String>,
}

impl KnowledgeStore {
    /// Load the knowledge document from `path`.
    ///
    /// Fails softly: a missing file or invalid JSON logs at error
    /// severity and installs the sentinel document.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let formatted = read_formatted(&path);
        Self {
            path,
            formatted: RwLock::new(formatted),
        }
    }

    /// The formatted knowledge string for prompt assembly.
    pub fn formatted(&self) -> String {
        self.formatted
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Whether the store is serving the degraded sentinel document.
    pub fn is_degraded(&self) -> bool {
        self.formatted().contains("Base de conhecimento indisponível")
    }

    /// Re-read the document from disk. Operator-triggered only; regular
    /// tasks never call this.
    pub fn reload(&self) {
        let formatted = read_formatted(&self.path);
        let mut slot = self
            .formatted
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = formatted;
    }
}

fn read_formatted(path: &Path) -> String {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            error!(
                "knowledge file {} unreadable: {e} — serving degraded answers",
                path.display()
            );
            return SENTINEL_DOCUMENT.to_string();
        }
    };

    let mut value: serde_json::Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            error!(
                "knowledge file {} is not valid JSON: {e} — serving degraded answers",
                path.display()
            );
            return SENTINEL_DOCUMENT.to_string();
        }
    };

    if !value.is_object() {
        error!(
            "knowledge file {} must be a JSON object (category → facts) — serving degraded answers",
            path.display()
        );
        return SENTINEL_DOCUMENT.to_string();
    }

    sanitize_value(&mut value);

    let formatted = serde_json::to_string_pretty(&value)
        .unwrap_or_else(|_| SENTINEL_DOCUMENT.to_string());
    info!(
        "knowledge document loaded from {} ({} bytes)",
        path.display(),
        formatted.len()
    );
    formatted
}

/// Recursively sanitize every string in the document: NUL and CR
/// stripped, length bounded. The data file feeds the prompt, so it gets
/// the same treatment as user input.
fn sanitize_value(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => {
            *s = sanitize_knowledge_string(s);
        }
        serde_json::Value::Array(items) => {
            for item in items {
                sanitize_value(item);
            }
        }
        serde_json::Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                sanitize_value(item);
            }
        }
        _ => {}
    }
}
