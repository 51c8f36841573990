//! The Runtime Loop (C10, spec §4.10): the one place every other component
//! is wired together. Grounded on
//! `knhk-autonomic::controller::AutonomicController::execute_cycle`'s
//! read-then-stage-then-stage-then-record-then-commit shape, generalized
//! from a fixed MAPE-K tick over infrastructure metrics to a mailbox-driven
//! per-session turn over engineered context.
//!
//! One `RuntimeLoop` instance is one logical loop for one agent process
//! (spec §5: "each agent process is one OS process running a small worker
//! pool"). `run` drives it until told to stop; `run_once` drains a single
//! batch and is the shape integration tests drive directly.

use std::sync::Arc;
use std::time::Duration;

use quadracode_context::ports::{Governor, LlmDriver, Scorer, WorkspaceIntegrityPort};
use quadracode_fabric::{CheckpointStore, Mailbox, StreamId};
use quadracode_otel::{Emitter, Stream as TelemetryStream};
use quadracode_prp::TransitionMode;
use quadracode_registry::Registry;
use quadracode_timetravel::TimeTravelRecorder;
use quadracode_types::{Config, Envelope, ExhaustionMode, Payload, PayloadFields, PrpPhase, SessionState};
use tokio::sync::watch;
use tracing::{instrument, warn};

use crate::dead_letter::{self, RetryTracker};
use crate::dedupe;
use crate::error::{Result, RuntimeError};
use crate::outcome::EnvelopeOutcome;
use crate::prp_ops;
use crate::session_lock::SessionLocks;
use crate::tool::ToolExecutor;

const DEFAULT_BATCH_SIZE: usize = 16;
const MAX_CHECKPOINT_ATTEMPTS: u32 = 3;
const EMPTY_BATCH_POLL: Duration = Duration::from_millis(100);
const BASE_SYSTEM_PROMPT: &str = "You are a Quadracode agent operating under the Perpetual Refinement Protocol.";
const MEMORY_GUIDANCE: &str =
    "Cite prior ledger entries by cycle_id. Never claim completion without passing tests and the declared artifacts.";

/// Where a tool call asking the runtime to message another recipient is
/// recognized (spec §4.10 step 5: "outbound message produced by the driver
/// or by autonomous tool handlers").
const SEND_MESSAGE_TOOL: &str = "send_message";

fn payload_fields(payload: Payload) -> PayloadFields {
    match payload {
        Payload::Parsed(fields) => fields,
        Payload::Raw(_) => PayloadFields::default(),
    }
}

fn system_banner(state: &SessionState) -> String {
    format!("cycle={} phase={:?} exhaustion={:?}", state.cycle_counter, state.prp_phase, state.exhaustion.mode)
}

/// Everything the runtime loop needs that is not itself: ports, stores, and
/// the components it commits C2/C1/C12 writes through. Passed to
/// [`RuntimeLoop::new`] as a single bundle so the constructor's arity does
/// not grow every time a port is added.
pub struct RuntimeLoopDeps {
    pub mailbox: Arc<dyn Mailbox>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub registry: Arc<Registry>,
    pub llm: Arc<dyn LlmDriver>,
    pub governor: Arc<dyn Governor>,
    pub scorer: Arc<dyn Scorer>,
    pub workspace: Arc<dyn WorkspaceIntegrityPort>,
    pub recorder: Arc<TimeTravelRecorder>,
    pub emitter: Arc<Emitter>,
    pub tool_executor: Arc<dyn ToolExecutor>,
}

pub struct RuntimeLoop {
    self_recipient: String,
    skeptic_recipient: String,
    deps: RuntimeLoopDeps,
    config: Config,
    locks: SessionLocks,
    retry: RetryTracker,
    batch_size: usize,
}

impl RuntimeLoop {
    pub fn new(self_recipient: impl Into<String>, skeptic_recipient: impl Into<String>, deps: RuntimeLoopDeps, config: Config) -> Self {
        Self {
            self_recipient: self_recipient.into(),
            skeptic_recipient: skeptic_recipient.into(),
            deps,
            config,
            locks: SessionLocks::new(),
            retry: RetryTracker::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Drain one batch read from `mailbox/<self>`, processing every entry.
    /// Used directly by tests; `run` calls this in a loop.
    pub async fn run_once(&self) -> Result<Vec<EnvelopeOutcome>> {
        let batch = self.deps.mailbox.read(&self.self_recipient, self.batch_size).await?;
        let mut outcomes = Vec::with_capacity(batch.len());
        for (stream_id, envelope) in batch {
            outcomes.push(self.process_one(stream_id, envelope).await?);
            // Spec §5: "the loop is cooperative and must yield between envelopes."
            tokio::task::yield_now().await;
        }
        Ok(outcomes)
    }

    /// Run until `shutdown` is signaled (spec §5: "graceful shutdown waits
    /// for in-flight session turns ... then stops reading new envelopes").
    /// A fatal checkpoint failure (spec §7) stops the loop and returns
    /// `Err` rather than continuing to read; every other per-envelope error
    /// is logged and the envelope is left for redelivery.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            let batch = self.deps.mailbox.read(&self.self_recipient, self.batch_size).await?;
            if batch.is_empty() {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return Ok(());
                        }
                    }
                    _ = tokio::time::sleep(EMPTY_BATCH_POLL) => {}
                }
                continue;
            }

            for (stream_id, envelope) in batch {
                match self.process_one(stream_id, envelope).await {
                    Ok(_) => {}
                    Err(err @ RuntimeError::CheckpointFatal(_, _)) => {
                        tracing::error!(error = %err, "checkpoint store write failed repeatedly, stopping runtime loop");
                        return Err(err);
                    }
                    Err(err) => {
                        warn!(error = %err, "turn processing failed, envelope left for redelivery");
                    }
                }
                tokio::task::yield_now().await;
            }
        }
    }

    #[instrument(skip(self, envelope), fields(recipient = %self.self_recipient))]
    async fn process_one(&self, stream_id: StreamId, envelope: Envelope) -> Result<EnvelopeOutcome> {
        let payload = envelope.payload();

        let Some(session_id) = payload.session_id().filter(|_| !payload.is_poison()) else {
            return self.handle_poison(stream_id, envelope, "malformed_or_missing_session_id").await;
        };

        let _session_guard = self.locks.acquire(session_id.clone()).await;

        let mut state = self.deps.checkpoints.get(&session_id).await?.unwrap_or_else(|| SessionState::new(session_id.clone()));

        if dedupe::already_processed(&state, &self.self_recipient, stream_id) {
            // Spec §4.10 step 6 / §8 S6: crash between `put` and `ack` is
            // acceptable; the dedupe set loaded from the checkpoint (not a
            // process-local cache) still recognizes the replay after a
            // restart, so a redelivered, already-checkpointed turn is simply
            // acked again without rerunning the driver.
            self.deps.mailbox.ack(&self.self_recipient, stream_id).await?;
            return Ok(EnvelopeOutcome::Acked);
        }

        let original_fields = payload_fields(payload);

        if envelope.sender == self.skeptic_recipient {
            match self.rewrite_as_skeptic_trigger(&mut state, &envelope, stream_id).await? {
                Some(outcome) => return Ok(outcome),
                None => {}
            }
        } else {
            state.conversation.push(quadracode_context::pre_process::user_message(envelope.message.clone()));
        }

        let exhaustion_before = state.exhaustion.mode;

        let pre_outcome = quadracode_context::pre_process(&mut state, &self.config, self.deps.llm.as_ref(), self.deps.registry.as_ref()).await?;
        self.deps.recorder.log_stage(
            &state,
            "pre_process",
            serde_json::json!({
                "history_compressed": pre_outcome.history_compressed,
                "curation_steps": pre_outcome.curation_steps.len(),
                "hotpath_violations": pre_outcome.hotpath_violations,
                "exhaustion_mode": pre_outcome.exhaustion_mode,
            }),
            None,
        );
        self.deps.emitter.emit(
            TelemetryStream::ContextMetrics,
            "pre_process",
            Some(state.session_id.clone()),
            serde_json::json!({"exhaustion_probability": pre_outcome.exhaustion_probability}),
        );

        let segments_snapshot: Vec<_> = state.segments.iter().cloned().collect();
        let quality = self.deps.scorer.score(&segments_snapshot);
        self.deps.emitter.emit(
            TelemetryStream::ContextMetrics,
            "quality_score",
            Some(state.session_id.clone()),
            serde_json::json!({"overall": quality.overall(), "relevance": quality.relevance, "coherence": quality.coherence}),
        );

        if pre_outcome.exhaustion_mode == ExhaustionMode::PredictedExhaustion && state.prp_phase == PrpPhase::Execute {
            let from = state.prp_phase;
            if quadracode_prp::transition(&mut state, PrpPhase::Hypothesize, TransitionMode::Lenient, false).is_ok() && state.prp_phase == PrpPhase::Hypothesize
            {
                self.deps.recorder.log_transition(
                    &state,
                    "predicted_exhaustion_recall",
                    serde_json::json!({"from": from, "to": "hypothesize"}),
                    None,
                );
                self.deps.emitter.emit(
                    TelemetryStream::PrpTelemetry,
                    "transition",
                    Some(state.session_id.clone()),
                    serde_json::json!({"from": from, "to": "hypothesize", "reason": "predicted_exhaustion"}),
                );
            }
        }

        let banner = system_banner(&state);
        let outline = quadracode_context::govern_context(&state.segments, self.deps.governor.as_ref(), self.config.governor_max_segments, self.config.critical_priority, banner);
        let prompt = quadracode_context::assemble_prompt(&state, BASE_SYSTEM_PROMPT, &outline, MEMORY_GUIDANCE);

        let driver_outcome = quadracode_context::drive(&mut state, self.deps.llm.as_ref(), &prompt).await?;
        self.deps.recorder.log_stage(
            &state,
            "driver",
            serde_json::json!({
                "assistant_message_len": driver_outcome.turn.assistant_message.len(),
                "tool_calls": driver_outcome.turn.tool_calls.len(),
                "false_stop": driver_outcome.false_stop,
            }),
            None,
        );

        let mut outbound = Vec::new();
        if driver_outcome.false_stop {
            outbound.push(self.skeptic_routing_envelope(&state, &driver_outcome.turn.assistant_message, &original_fields));
        }
        for call in &driver_outcome.turn.tool_calls {
            if call.name == SEND_MESSAGE_TOOL {
                if let Some(env) = self.send_message_envelope(&state, call, &original_fields) {
                    outbound.push(env);
                }
            }
        }
        if !driver_outcome.false_stop && !driver_outcome.turn.assistant_message.is_empty() {
            outbound.push(self.reply_envelope(&state, &envelope, &driver_outcome.turn.assistant_message, &original_fields));
        }

        prp_ops::dispatch(&mut state, &driver_outcome.turn.tool_calls);

        let mut tool_responses = Vec::with_capacity(driver_outcome.turn.tool_calls.len());
        for call in &driver_outcome.turn.tool_calls {
            self.deps.recorder.log_tool(&state, call.name.clone(), call.arguments.clone());
            tool_responses.push(self.deps.tool_executor.execute(&state, call).await?);
        }

        let post_outcome = quadracode_context::post_process(&mut state, tool_responses, self.deps.workspace.as_ref(), exhaustion_before).await?;
        self.deps.recorder.log_stage(
            &state,
            "post_process",
            serde_json::json!({
                "challenge_emitted": post_outcome.challenge_emitted,
                "test_results_captured": post_outcome.test_results_captured.is_some(),
            }),
            None,
        );

        if state.exhaustion.mode != exhaustion_before {
            self.deps.recorder.log_snapshot(&state, "exhaustion_mode_change", serde_json::json!({"from": exhaustion_before, "to": state.exhaustion.mode}));
        }

        // Spec §4.10 step 5: every outbound envelope produced by this turn is
        // published, in program order, before the inbound is acked.
        for env in outbound {
            self.deps.mailbox.publish(&env.recipient.clone(), env).await?;
        }

        // Folded into `state` before the checkpoint write so the dedupe
        // entry is durable the instant `put` succeeds, even if the process
        // crashes before the `ack` below lands (spec §4.10 step 6, §8 S6).
        dedupe::mark_processed(&mut state, &self.self_recipient, stream_id);
        self.commit_checkpoint(&state).await?;
        self.deps.mailbox.ack(&self.self_recipient, stream_id).await?;

        self.deps.emitter.emit(
            TelemetryStream::AutonomousEvents,
            "cycle_complete",
            Some(state.session_id.clone()),
            serde_json::json!({
                "prp_phase": state.prp_phase,
                "tokens_this_turn": state.total_context_tokens(),
                "false_stop_events": state.autonomy.false_stop_events,
                "cycle_counter": state.cycle_counter,
            }),
        );

        Ok(EnvelopeOutcome::Acked)
    }

    /// Parses `envelope.message` as a skeptic trigger and, on success,
    /// snapshots the workspace and applies it (spec §4.7). Returns
    /// `Some(outcome)` when the caller should return immediately (a
    /// malformed trigger still within or past its retry budget); `None`
    /// means the trigger applied (or the phase mismatch was merely logged)
    /// and the normal pipeline should continue.
    async fn rewrite_as_skeptic_trigger(&self, state: &mut SessionState, envelope: &Envelope, stream_id: StreamId) -> Result<Option<EnvelopeOutcome>> {
        let trigger = match quadracode_skeptic::parse_trigger(&envelope.message) {
            Ok(trigger) => trigger,
            Err(_) => {
                let attempts = self.retry.record_failure(&self.self_recipient, stream_id.0);
                if dead_letter::exceeded_retry_budget(attempts) {
                    dead_letter::dead_letter(self.deps.mailbox.as_ref(), envelope.clone(), "malformed_skeptic_trigger").await?;
                    self.retry.clear(&self.self_recipient, stream_id.0);
                    self.deps.mailbox.ack(&self.self_recipient, stream_id).await?;
                    return Ok(Some(EnvelopeOutcome::DeadLettered));
                }
                return Ok(Some(EnvelopeOutcome::Retried));
            }
        };
        self.retry.clear(&self.self_recipient, stream_id.0);

        if state.prp_phase == PrpPhase::Propose {
            if let Some(record) = self.deps.workspace.snapshot_on_skeptic_rejection(&state.workspace.workspace).await? {
                self.deps.recorder.log_snapshot(state, "skeptic_rejection", serde_json::json!({"snapshot_id": record.id}));
                state.workspace.push_snapshot(record);
            }
        }

        if let Err(err) = quadracode_skeptic::apply_trigger(state, &trigger) {
            warn!(error = %err, "skeptic trigger could not be applied, session was not in propose");
            state.invariants.violation_log.push(format!("skeptic_trigger_rejected: {err}"));
        } else {
            self.deps.recorder.log_transition(
                state,
                "skeptic_rejection",
                serde_json::json!({"to": "hypothesize", "required_artifacts": state.required_artifacts}),
                None,
            );
            self.deps.emitter.emit(
                TelemetryStream::PrpTelemetry,
                "transition",
                Some(state.session_id.clone()),
                serde_json::json!({"to": "hypothesize", "reason": "skeptic_rejection"}),
            );
        }

        // The rewritten turn carries the critique forward as a system/tool
        // message pair rather than the raw rejection text (spec §4.7).
        state.conversation.push(quadracode_context::driver::assistant_message(format!(
            "Skeptic rejected cycle {}: {}",
            trigger.cycle_iteration,
            trigger.rationale.clone().unwrap_or_default()
        )));

        Ok(None)
    }

    async fn handle_poison(&self, stream_id: StreamId, envelope: Envelope, reason: &str) -> Result<EnvelopeOutcome> {
        let attempts = self.retry.record_failure(&self.self_recipient, stream_id.0);
        if dead_letter::exceeded_retry_budget(attempts) {
            dead_letter::dead_letter(self.deps.mailbox.as_ref(), envelope, reason).await?;
            self.retry.clear(&self.self_recipient, stream_id.0);
            self.deps.mailbox.ack(&self.self_recipient, stream_id).await?;
            return Ok(EnvelopeOutcome::DeadLettered);
        }
        Ok(EnvelopeOutcome::Retried)
    }

    async fn commit_checkpoint(&self, state: &SessionState) -> Result<()> {
        let mut last_err = None;
        for attempt in 0..MAX_CHECKPOINT_ATTEMPTS {
            match self.deps.checkpoints.put(state).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(attempt, error = %err, "checkpoint write failed, retrying");
                    last_err = Some(err);
                    tokio::time::sleep(Duration::from_millis(50 * (attempt as u64 + 1))).await;
                }
            }
        }
        Err(RuntimeError::CheckpointFatal(state.session_id.to_string(), last_err.map(|e| e.to_string()).unwrap_or_default()))
    }

    fn skeptic_routing_envelope(&self, state: &SessionState, assistant_message: &str, original: &PayloadFields) -> Envelope {
        let mut fields = original.clone();
        fields.session_id = Some(state.session_id.clone());
        fields.reply_to = Some(self.self_recipient.clone());
        Envelope::new(self.self_recipient.clone(), self.skeptic_recipient.clone(), format!("false_stop: {assistant_message}"), &Payload::from_fields(fields))
    }

    fn reply_envelope(&self, state: &SessionState, inbound: &Envelope, assistant_message: &str, original: &PayloadFields) -> Envelope {
        let recipient = original.reply_to.clone().unwrap_or_else(|| inbound.sender.clone());
        let mut fields = original.clone();
        fields.session_id = Some(state.session_id.clone());
        Envelope::new(self.self_recipient.clone(), recipient, assistant_message.to_string(), &Payload::from_fields(fields))
    }

    fn send_message_envelope(&self, state: &SessionState, call: &quadracode_context::ToolCall, original: &PayloadFields) -> Option<Envelope> {
        let recipient = call.arguments.get("recipient").and_then(|v| v.as_str())?;
        let message = call.arguments.get("message").and_then(|v| v.as_str()).unwrap_or_default();
        let mut fields = original.clone();
        fields.session_id = Some(state.session_id.clone());
        Some(Envelope::new(self.self_recipient.clone(), recipient.to_string(), message.to_string(), &Payload::from_fields(fields)))
    }
}
