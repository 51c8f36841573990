use thiserror::Error;

pub type Result<T> = std::result::Result<T, ContextError>;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("llm driver error: {0}")]
    Driver(String),

    #[error("registry error: {0}")]
    Registry(#[from] quadracode_registry::RegistryError),

    #[error("segment store invariant violated: {0}")]
    Segment(#[from] quadracode_types::TypesError),

    #[error("workspace integrity error: {0}")]
    Workspace(String),
}
