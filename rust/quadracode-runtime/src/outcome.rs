//! Explicit result of processing one inbound envelope (spec §9 redesign
//! flag: "exceptions as control flow for re-queue / skip" replaced by a
//! result variant instead of catching a re-queue/skip exception).

/// What happened to one envelope read off `mailbox/<self>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeOutcome {
    /// The turn ran to completion (or the envelope was a duplicate of an
    /// already-processed one) and has been acked.
    Acked,
    /// Left un-acked for redelivery: a transient failure, or a malformed
    /// skeptic trigger still within its retry budget.
    Retried,
    /// Recorded to `mailbox/dead-letter` and acked after exceeding the
    /// retry budget (spec §7).
    DeadLettered,
}
