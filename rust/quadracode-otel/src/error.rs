use thiserror::Error;

pub type Result<T> = std::result::Result<T, OtelError>;

#[derive(Debug, Error)]
pub enum OtelError {
    #[error("tracing subscriber already initialized")]
    AlreadyInitialized,

    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalDefault(String),
}
