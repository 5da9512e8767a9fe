use thiserror::Error;

/// Configuration errors raised before any request is made
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    MissingApiKey(&'static str),
}

/// Errors at the chat message boundary
#[derive(Debug, Error)]
pub enum ChatError {
    /// A message carried a role other than system, user or assistant
    #[error("Unsupported chat role: {0}")]
    UnknownRole(String),

    #[error("Conversation has no messages")]
    EmptyConversation,

    #[error("Invalid chat messages: {0}")]
    InvalidMessages(#[from] serde_json::Error),
}
