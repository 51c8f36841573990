//! Dead-letter handling for poison envelopes and malformed skeptic triggers
//! (spec §7): after `N` failed reads/parses, the entry is recorded to
//! `mailbox/dead-letter` and the original is acked. Retention is a ring of
//! the last 1000 entries (spec §9 Open Question, implementer's choice).

use dashmap::DashMap;
use quadracode_fabric::Mailbox;
use quadracode_types::{Envelope, Payload};
use tracing::warn;

pub const DEAD_LETTER_RECIPIENT: &str = "dead-letter";
pub const MAX_RETRY_ATTEMPTS: u32 = 3;
const DEAD_LETTER_RETENTION: usize = 1000;

/// Tracks failed-read/parse attempts per `(recipient, stream_id)` so a
/// poison envelope or malformed skeptic trigger is re-queued a bounded
/// number of times before being dead-lettered (spec §7).
#[derive(Default)]
pub struct RetryTracker {
    attempts: DashMap<(String, u64), u32>,
}

impl RetryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one more failed attempt and returns the new count.
    pub fn record_failure(&self, recipient: &str, stream_id: u64) -> u32 {
        let mut entry = self.attempts.entry((recipient.to_string(), stream_id)).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn clear(&self, recipient: &str, stream_id: u64) {
        self.attempts.remove(&(recipient.to_string(), stream_id));
    }
}

/// Append `envelope` to `mailbox/dead-letter`, evicting the oldest entry
/// first if the mailbox is already at the retention cap.
pub async fn dead_letter(mailbox: &dyn Mailbox, envelope: Envelope, reason: &str) -> quadracode_fabric::Result<()> {
    let existing = mailbox.read(DEAD_LETTER_RECIPIENT, DEAD_LETTER_RETENTION + 1).await?;
    if existing.len() >= DEAD_LETTER_RETENTION {
        if let Some((oldest_id, _)) = existing.first() {
            mailbox.ack(DEAD_LETTER_RECIPIENT, *oldest_id).await?;
        }
    }

    warn!(reason, sender = %envelope.sender, recipient = %envelope.recipient, "dead-lettering envelope");
    let mut fields = match envelope.payload() {
        Payload::Parsed(fields) => fields,
        Payload::Raw(_) => Default::default(),
    };
    fields.extra.insert("dead_letter_reason".to_string(), serde_json::Value::String(reason.to_string()));
    let dead_envelope = envelope.with_payload(&Payload::from_fields(fields));
    mailbox.publish(DEAD_LETTER_RECIPIENT, dead_envelope).await?;
    Ok(())
}

/// True once `record_failure`'s returned count has exceeded the retry budget.
pub fn exceeded_retry_budget(attempts: u32) -> bool {
    attempts > MAX_RETRY_ATTEMPTS
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadracode_fabric::InMemoryMailbox;

    #[tokio::test]
    async fn dead_letter_appends_with_reason() {
        let mailbox = InMemoryMailbox::new();
        let envelope = Envelope::new("human", "orchestrator", "hi", &Payload::empty());
        dead_letter(&mailbox, envelope, "poison_envelope").await.unwrap();

        let entries = mailbox.read(DEAD_LETTER_RECIPIENT, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        match entries[0].1.payload() {
            Payload::Parsed(fields) => {
                assert_eq!(fields.extra.get("dead_letter_reason").and_then(|v| v.as_str()), Some("poison_envelope"));
            }
            Payload::Raw(_) => panic!("expected parsed payload"),
        }
    }

    #[test]
    fn retry_tracker_counts_up() {
        let tracker = RetryTracker::new();
        assert_eq!(tracker.record_failure("orchestrator", 1), 1);
        assert_eq!(tracker.record_failure("orchestrator", 1), 2);
        assert!(!exceeded_retry_budget(2));
        assert_eq!(tracker.record_failure("orchestrator", 1), 3);
        let fourth = tracker.record_failure("orchestrator", 1);
        assert!(exceeded_retry_budget(fourth));
    }
}
