//! Wire envelope (spec §3, §4.1, §6).
//!
//! An envelope's top-level fields are scalars; `payload` travels as a single
//! JSON-encoded string on the wire and is parsed into [`Payload`] by
//! consumers. A payload that fails to parse is not rejected: it is kept as
//! [`Payload::Raw`] and the runtime treats the entry as a poison message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::session::SessionId;

/// A message moving through the mailbox fabric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    pub recipient: String,
    pub message: String,
    /// JSON-encoded on the wire; use [`Envelope::payload`]/[`Envelope::with_payload`]
    /// to work with the parsed form.
    pub payload: String,
}

impl Envelope {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, message: impl Into<String>, payload: &Payload) -> Self {
        Self {
            timestamp: Utc::now(),
            sender: sender.into(),
            recipient: recipient.into(),
            message: message.into(),
            payload: payload.to_wire(),
        }
    }

    /// Parse the wire payload. Malformed JSON never fails this call; it is
    /// represented as `Payload::Raw` instead (spec §4.1 poison-message rule).
    pub fn payload(&self) -> Payload {
        Payload::from_wire(&self.payload)
    }

    pub fn with_payload(mut self, payload: &Payload) -> Self {
        self.payload = payload.to_wire();
        self
    }
}

/// The nested fields carried by an envelope's `payload`, per spec §3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PayloadFields {
    pub session_id: Option<SessionId>,
    pub thread_id: Option<String>,
    pub ticket_id: Option<String>,
    pub reply_to: Option<String>,
    /// Serialized message trace (opaque to the fabric).
    #[serde(default)]
    pub message_trace: Vec<Value>,
    /// Forward-compatible extra keys not named above.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A parsed payload, or the raw string when parsing failed.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Parsed(PayloadFields),
    /// `_raw` field of spec §4.1: the envelope is treated as a poison message.
    Raw(String),
}

impl Payload {
    pub fn empty() -> Self {
        Payload::Parsed(PayloadFields::default())
    }

    pub fn from_fields(fields: PayloadFields) -> Self {
        Payload::Parsed(fields)
    }

    fn from_wire(raw: &str) -> Self {
        match serde_json::from_str::<PayloadFields>(raw) {
            Ok(fields) => Payload::Parsed(fields),
            Err(_) => Payload::Raw(raw.to_string()),
        }
    }

    fn to_wire(&self) -> String {
        match self {
            Payload::Parsed(fields) => serde_json::to_string(fields).unwrap_or_default(),
            Payload::Raw(raw) => raw.clone(),
        }
    }

    pub fn is_poison(&self) -> bool {
        matches!(self, Payload::Raw(_))
    }

    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Payload::Parsed(fields) => fields.session_id.clone(),
            Payload::Raw(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_parsed_payload() {
        let fields = PayloadFields {
            session_id: Some(SessionId::new("s-1")),
            thread_id: Some("t-1".into()),
            ..Default::default()
        };
        let payload = Payload::from_fields(fields.clone());
        let env = Envelope::new("human", "orchestrator", "hello", &payload);
        match env.payload() {
            Payload::Parsed(f) => assert_eq!(f, fields),
            Payload::Raw(_) => panic!("expected parsed payload"),
        }
    }

    #[test]
    fn malformed_payload_becomes_raw() {
        let env = Envelope {
            timestamp: Utc::now(),
            sender: "skeptic".into(),
            recipient: "orchestrator".into(),
            message: "reject".into(),
            payload: "{not json".into(),
        };
        assert!(env.payload().is_poison());
    }
}
