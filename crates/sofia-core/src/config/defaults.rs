//! Serde default helpers for the config tree.

pub fn default_name() -> String {
    "SofIA".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub fn default_port() -> u16 {
    8080
}

pub fn default_queue_capacity() -> usize {
    256
}

pub fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

pub fn default_temperature() -> f32 {
    0.4
}

pub fn default_max_output_tokens() -> u32 {
    1024
}

pub fn default_request_timeout_secs() -> u64 {
    30
}

pub fn default_knowledge_path() -> String {
    "dinamica_sports_knowledge.json".to_string()
}

pub fn default_cache_capacity() -> usize {
    128
}

pub fn default_max_attempts() -> u32 {
    3
}

pub fn default_retry_delay_secs() -> u64 {
    10
}

pub fn default_concurrency() -> usize {
    2
}
