//! The message fabric runtime: durable per-recipient mailboxes (C1) and the
//! per-session checkpoint store (C2), both specified as narrow traits with
//! an in-memory and a `sled`-backed implementation, the way
//! `knhk-lockchain::storage` wraps a single storage contract over `sled`.

pub mod checkpoint;
pub mod error;
pub mod mailbox;

pub use checkpoint::{CheckpointStore, InMemoryCheckpointStore, SledCheckpointStore};
pub use error::{FabricError, Result};
pub use mailbox::{InMemoryMailbox, Mailbox, SledMailbox, StreamId};
