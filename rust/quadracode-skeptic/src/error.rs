use thiserror::Error;

pub type Result<T> = std::result::Result<T, SkepticError>;

/// Errors parsing or applying a skeptic trigger (spec §4.7, §7).
#[derive(Debug, Error)]
pub enum SkepticError {
    #[error("malformed skeptic trigger: {0}")]
    MalformedTrigger(String),

    #[error("prp transition error: {0}")]
    Prp(#[from] quadracode_prp::PrpError),
}
