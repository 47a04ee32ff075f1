use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrategistError {
    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Strategy not found: {0}")]
    StrategyNotFound(i64),

    // Collaborator errors
    #[error("HTTP {status}: {message}")]
    Fetch { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error("Notification failed: {channel}: {message}")]
    Notify { channel: String, message: String },

    // Node configuration errors
    #[error("Template error: {0}")]
    Template(String),

    #[error("Condition error: {0}")]
    Condition(String),

    #[error("Node {node} failed: {message}")]
    NodeFailed { node: String, message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StrategistError>;
