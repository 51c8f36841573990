use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("mailbox error: {0}")]
    Mailbox(#[from] quadracode_fabric::FabricError),

    #[error("context pipeline error: {0}")]
    Context(#[from] quadracode_context::ContextError),

    #[error("prp error: {0}")]
    Prp(#[from] quadracode_prp::PrpError),

    #[error("skeptic error: {0}")]
    Skeptic(#[from] quadracode_skeptic::SkepticError),

    #[error("time-travel error: {0}")]
    TimeTravel(#[from] quadracode_timetravel::TimeTravelError),

    /// Fatal per spec §7: the checkpoint store has repeatedly failed to
    /// write. The loop stops reading new envelopes and exits non-zero.
    #[error("checkpoint store write failed after retries for session {0}: {1}")]
    CheckpointFatal(String, String),
}
