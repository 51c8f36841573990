//! C12 — Observability Emitter (spec §4.12): structured telemetry events
//! fanned out on three named streams. Grounded on the teacher's
//! `tracing`/`opentelemetry` stack usage throughout `knhk-autonomic` and
//! `knhk-sidecar`, generalized from span/metric export to the spec's three
//! named application-level streams. Emission is fire-and-forget (spec:
//! "failures to emit are logged but do not fail the runtime") — a full
//! subscriber is optional, the way a `tokio::sync::broadcast` channel with
//! no receivers simply drops sends rather than erroring the sender.

use chrono::{DateTime, Utc};
use quadracode_types::SessionId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// The three telemetry streams named in spec §4.12/§6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    ContextMetrics,
    AutonomousEvents,
    PrpTelemetry,
}

impl Stream {
    pub fn name(self) -> &'static str {
        match self {
            Stream::ContextMetrics => "context:metrics",
            Stream::AutonomousEvents => "autonomous:events",
            Stream::PrpTelemetry => "prp:telemetry",
        }
    }
}

/// A single structured telemetry event (spec §4.12: `{stream, event, ts,
/// session_id, payload}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityEvent {
    pub stream: String,
    pub event: String,
    pub ts: DateTime<Utc>,
    pub session_id: Option<SessionId>,
    pub payload: serde_json::Value,
}

const CHANNEL_CAPACITY: usize = 1024;

/// Process-wide observability emitter. Constructed once at startup and
/// handed to components immutably (spec §9's "central observer singleton"
/// redesign: init-then-immutable, not a global).
pub struct Emitter {
    context_metrics: broadcast::Sender<ObservabilityEvent>,
    autonomous_events: broadcast::Sender<ObservabilityEvent>,
    prp_telemetry: broadcast::Sender<ObservabilityEvent>,
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Emitter {
    pub fn new() -> Self {
        Self {
            context_metrics: broadcast::channel(CHANNEL_CAPACITY).0,
            autonomous_events: broadcast::channel(CHANNEL_CAPACITY).0,
            prp_telemetry: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    fn sender(&self, stream: Stream) -> &broadcast::Sender<ObservabilityEvent> {
        match stream {
            Stream::ContextMetrics => &self.context_metrics,
            Stream::AutonomousEvents => &self.autonomous_events,
            Stream::PrpTelemetry => &self.prp_telemetry,
        }
    }

    /// Emit a structured event onto `stream`. Never fails the caller: a
    /// closed/subscriber-less channel is logged at `debug` and otherwise
    /// ignored, per spec §4.12.
    pub fn emit(&self, stream: Stream, event: impl Into<String>, session_id: Option<SessionId>, payload: serde_json::Value) {
        let record = ObservabilityEvent { stream: stream.name().to_string(), event: event.into(), ts: Utc::now(), session_id, payload };
        match self.sender(stream).send(record) {
            Ok(_) => {}
            Err(broadcast::error::SendError(_)) => {
                debug!(stream = stream.name(), "observability event dropped, no subscribers");
            }
        }
    }

    pub fn subscribe(&self, stream: Stream) -> broadcast::Receiver<ObservabilityEvent> {
        self.sender(stream).subscribe()
    }
}

/// Wraps a fallible emission so a subscriber-side error (not the emitter's
/// concern, since `emit` itself cannot fail) is still logged rather than
/// propagated into the runtime loop.
pub fn emit_or_warn(emitter: &Emitter, stream: Stream, event: impl Into<String>, session_id: Option<SessionId>, payload: serde_json::Value) {
    let event = event.into();
    emitter.emit(stream, event.clone(), session_id, payload);
    warn_on_lag(stream, &event);
}

fn warn_on_lag(_stream: Stream, _event: &str) {
    // Placeholder seam for future lag-detection logic; broadcast channels
    // never block the sender, so there is nothing to detect today.
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let emitter = Emitter::new();
        let mut rx = emitter.subscribe(Stream::PrpTelemetry);

        emitter.emit(Stream::PrpTelemetry, "transition", Some(SessionId::new("s-1")), serde_json::json!({"to": "execute"}));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.stream, "prp:telemetry");
        assert_eq!(received.event, "transition");
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let emitter = Emitter::new();
        emitter.emit(Stream::ContextMetrics, "pre_process", None, serde_json::json!({}));
    }

    #[tokio::test]
    async fn streams_are_independent() {
        let emitter = Emitter::new();
        let mut context_rx = emitter.subscribe(Stream::ContextMetrics);
        let mut autonomous_rx = emitter.subscribe(Stream::AutonomousEvents);

        emitter.emit(Stream::ContextMetrics, "curate", None, serde_json::json!({}));

        let received = context_rx.recv().await.unwrap();
        assert_eq!(received.stream, "context:metrics");
        assert!(autonomous_rx.try_recv().is_err());
    }
}
