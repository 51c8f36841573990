//! The Context Engineering pipeline (C6): pre_process → govern_context →
//! driver → post_process, plus the curator and progressive loader that
//! pre_process calls into. Grounded on `knhk-autonomic`'s MAPE-K stage
//! decomposition (monitor/analyze/plan/execute), generalized from
//! infrastructure metrics to engineered context segments.

pub mod curator;
pub mod driver;
pub mod error;
pub mod govern;
pub mod hotpath;
pub mod ports;
pub mod post_process;
pub mod pre_process;
pub mod progressive_loader;
pub mod scorer;

pub use curator::{curate, CurationAction, CurationStep};
pub use driver::{assemble_prompt, drive, DriverOutcome};
pub use error::{ContextError, Result};
pub use govern::{govern_context, HeuristicGovernor, PromptOutline};
pub use hotpath::hotpath_violations;
pub use ports::{AssembledPrompt, DriverTurn, LlmDriver, NoWorkspaceIntegrity, NullLlmDriver, QualityScore, Scorer, ToolCall, WorkspaceIntegrityPort};
pub use post_process::{post_process, PostProcessOutcome, ToolResponse};
pub use pre_process::{pre_process, PreProcessOutcome};
pub use progressive_loader::{load_batch, Candidate, SegmentSource, SourceKind};
pub use scorer::HeuristicScorer;
