use thiserror::Error;

pub type Result<T> = std::result::Result<T, TimeTravelError>;

/// Errors from the time-travel event log (spec §4.9, §7).
#[derive(Debug, Error)]
pub enum TimeTravelError {
    #[error("time-travel log io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("event serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
