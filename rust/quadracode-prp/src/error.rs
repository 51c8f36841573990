use thiserror::Error;

pub type Result<T> = std::result::Result<T, PrpError>;

#[derive(Debug, Error)]
pub enum PrpError {
    #[error("prp_invalid_transition: {from:?} -> {to:?} is not allowed in current state")]
    InvalidTransition { from: quadracode_types::PrpPhase, to: quadracode_types::PrpPhase },

    #[error("novelty_blocked: hypothesis is too similar to a prior failed entry with the same strategy")]
    NoveltyBlocked,

    #[error("unknown cycle id: {0}")]
    UnknownCycle(u64),

    #[error("cycle {0} has already been concluded")]
    AlreadyConcluded(u64),
}
