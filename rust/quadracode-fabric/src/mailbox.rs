//! C1 — Message Envelope & Mailbox (spec §4.1).

use async_trait::async_trait;
use quadracode_types::Envelope;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::instrument;

use crate::error::Result;

/// Monotonically increasing id within one mailbox's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(pub u64);

/// Durable per-recipient mailbox stream with at-least-once delivery.
///
/// Within one mailbox, delivered entries carry monotonically increasing
/// stream ids (spec §3 invariant); deletion of an entry ([`Mailbox::ack`])
/// is the consumer's acknowledgement.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Append atomically to `mailbox/<recipient>`, returning the assigned id.
    async fn publish(&self, recipient: &str, envelope: Envelope) -> Result<StreamId>;

    /// Oldest-first entries not yet deleted by this consumer, at most `batch`.
    async fn read(&self, recipient: &str, batch: usize) -> Result<Vec<(StreamId, Envelope)>>;

    /// Remove the entry. Idempotent on already-removed ids.
    async fn ack(&self, recipient: &str, id: StreamId) -> Result<()>;

    async fn list_mailboxes(&self) -> Result<Vec<String>>;
}

/// In-memory mailbox backend, used by tests and as the default single-node
/// backend (spec §4.2 allows either for the analogous checkpoint store; the
/// mailbox contract is symmetric).
#[derive(Default)]
pub struct InMemoryMailbox {
    streams: Mutex<HashMap<String, VecDeque<(StreamId, Envelope)>>>,
    next_id: Mutex<HashMap<String, u64>>,
}

impl InMemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Mailbox for InMemoryMailbox {
    #[instrument(skip(self, envelope))]
    async fn publish(&self, recipient: &str, envelope: Envelope) -> Result<StreamId> {
        let mut next_id = self.next_id.lock().await;
        let id = next_id.entry(recipient.to_string()).or_insert(0);
        *id += 1;
        let stream_id = StreamId(*id);

        let mut streams = self.streams.lock().await;
        streams
            .entry(recipient.to_string())
            .or_default()
            .push_back((stream_id, envelope));

        Ok(stream_id)
    }

    async fn read(&self, recipient: &str, batch: usize) -> Result<Vec<(StreamId, Envelope)>> {
        let streams = self.streams.lock().await;
        Ok(streams
            .get(recipient)
            .map(|q| q.iter().take(batch).cloned().collect())
            .unwrap_or_default())
    }

    async fn ack(&self, recipient: &str, id: StreamId) -> Result<()> {
        let mut streams = self.streams.lock().await;
        if let Some(queue) = streams.get_mut(recipient) {
            queue.retain(|(stream_id, _)| *stream_id != id);
        }
        Ok(())
    }

    async fn list_mailboxes(&self) -> Result<Vec<String>> {
        let streams = self.streams.lock().await;
        Ok(streams.keys().cloned().collect())
    }
}

/// `sled`-backed durable mailbox: one tree per recipient, keyed by the
/// big-endian encoding of a monotonic id from `sled::Tree::generate_id`,
/// grounded on `knhk-lockchain::storage::LockchainStorage`'s use of a single
/// `sled::Db` with zero-padded keys for range ordering.
pub struct SledMailbox {
    db: sled::Db,
}

impl SledMailbox {
    pub fn open(path: &str) -> Result<Self> {
        Ok(Self { db: sled::open(path)? })
    }

    fn tree(&self, recipient: &str) -> Result<sled::Tree> {
        Ok(self.db.open_tree(format!("mailbox/{recipient}"))?)
    }
}

#[async_trait]
impl Mailbox for SledMailbox {
    #[instrument(skip(self, envelope))]
    async fn publish(&self, recipient: &str, envelope: Envelope) -> Result<StreamId> {
        let tree = self.tree(recipient)?;
        let id = tree.generate_id()?;
        let key = id.to_be_bytes();
        let value = serde_json::to_vec(&envelope)?;
        tree.insert(key, value)?;
        tree.flush_async().await?;
        Ok(StreamId(id))
    }

    async fn read(&self, recipient: &str, batch: usize) -> Result<Vec<(StreamId, Envelope)>> {
        let tree = self.tree(recipient)?;
        let mut out = Vec::with_capacity(batch);
        for item in tree.iter().take(batch) {
            let (key, value) = item?;
            let id = u64::from_be_bytes(key.as_ref().try_into().unwrap_or([0u8; 8]));
            let envelope: Envelope = serde_json::from_slice(&value)?;
            out.push((StreamId(id), envelope));
        }
        Ok(out)
    }

    async fn ack(&self, recipient: &str, id: StreamId) -> Result<()> {
        let tree = self.tree(recipient)?;
        tree.remove(id.0.to_be_bytes())?;
        Ok(())
    }

    async fn list_mailboxes(&self) -> Result<Vec<String>> {
        Ok(self
            .db
            .tree_names()
            .into_iter()
            .filter_map(|name| String::from_utf8(name.to_vec()).ok())
            .filter_map(|name| name.strip_prefix("mailbox/").map(|s| s.to_string()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadracode_types::Payload;

    fn test_envelope() -> Envelope {
        Envelope::new("human", "orchestrator", "hi", &Payload::empty())
    }

    #[tokio::test]
    async fn publish_then_read_then_ack_in_memory() {
        let mbox = InMemoryMailbox::new();
        let id = mbox.publish("orchestrator", test_envelope()).await.unwrap();
        let read = mbox.read("orchestrator", 10).await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].0, id);

        mbox.ack("orchestrator", id).await.unwrap();
        let after = mbox.read("orchestrator", 10).await.unwrap();
        assert!(after.is_empty());
    }

    #[tokio::test]
    async fn ack_is_idempotent_on_already_acked_ids() {
        let mbox = InMemoryMailbox::new();
        let id = mbox.publish("orchestrator", test_envelope()).await.unwrap();
        mbox.ack("orchestrator", id).await.unwrap();
        // Second ack on the same id must not error.
        mbox.ack("orchestrator", id).await.unwrap();
    }

    #[tokio::test]
    async fn stream_ids_are_monotonic_within_a_mailbox() {
        let mbox = InMemoryMailbox::new();
        let a = mbox.publish("orchestrator", test_envelope()).await.unwrap();
        let b = mbox.publish("orchestrator", test_envelope()).await.unwrap();
        assert!(b.0 > a.0);
    }

    #[tokio::test]
    async fn sled_mailbox_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mbox = SledMailbox::open(dir.path().join("db").to_str().unwrap()).unwrap();
        let id = mbox.publish("worker", test_envelope()).await.unwrap();
        let read = mbox.read("worker", 10).await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].0, id);
        mbox.ack("worker", id).await.unwrap();
        assert!(mbox.read("worker", 10).await.unwrap().is_empty());
    }
}
