//! The Perpetual Refinement Protocol: a guarded state machine (C4) plus its
//! refinement ledger and exhaustion predictor (C5), grounded on
//! `knhk-autonomic`'s guarded-phase controller and
//! `knhk-workflow-engine`'s failure predictor.

pub mod error;
pub mod fsm;
pub mod ledger;
pub mod predictor;

pub use error::{PrpError, Result};
pub use fsm::{transition, TransitionMode};
pub use ledger::{conclude_hypothesis, infer_causal_chain, propose_hypothesis, query_past_failures, CausalEdge};
pub use predictor::{
    compute_features, predict_exhaustion_probability, predicts_exhaustion, ExhaustionFeatures,
    PREDICTED_EXHAUSTION_THRESHOLD,
};
