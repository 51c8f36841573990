use thiserror::Error;

pub type Result<T> = std::result::Result<T, WorkspaceError>;

/// Errors from snapshotting, validating, restoring, or diffing a workspace
/// (spec §4.8, §7).
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("manifest serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("no snapshot found: {0}")]
    SnapshotNotFound(String),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
