use thiserror::Error;

/// Top-level error type for SofIA.
#[derive(Debug, Error)]
pub enum SofiaError {
    /// Error from the AI provider.
    #[error("provider error: {0}")]
    Provider(String),

    /// Error from a delivery channel.
    #[error("channel error: {0}")]
    Channel(String),

    /// Error from the task queue.
    #[error("queue error: {0}")]
    Queue(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
