//! Error types for the data model crate.

use thiserror::Error;

/// Result type for `quadracode-types` operations.
pub type Result<T> = std::result::Result<T, TypesError>;

/// Errors that can occur while constructing or validating core types.
#[derive(Debug, Error)]
pub enum TypesError {
    #[error("duplicate segment id: {0}")]
    DuplicateSegmentId(String),

    #[error("a session may have at most one conversation-summary segment")]
    MultipleConversationSummaries,

    #[error("invalid config: {0}")]
    Config(#[from] config::ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
