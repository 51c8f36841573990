//! Per-session dispatch lock (spec §5: "session dispatch grabs a per-session
//! lock ... so that at most one worker touches a given session's state at a
//! time"). Grounded on the same `DashMap<K, Arc<Mutex<_>>>` pattern
//! `quadracode-fabric`'s `SledMailbox`/`InMemoryMailbox` use for their own
//! per-recipient serialization, generalized from a mailbox stream to a
//! whole session turn.

use std::sync::Arc;

use dashmap::DashMap;
use quadracode_types::SessionId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Named-mutex table keyed by `session_id`. Entries are never evicted: the
/// number of distinct sessions a long-running process sees is bounded by
/// its own workload, not by this table.
#[derive(Default)]
pub struct SessionLocks {
    locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `session_id`, blocking until any other holder
    /// releases it. The returned guard is `'static`: safe to hold across an
    /// `.await` point without borrowing `self`.
    pub async fn acquire(&self, session_id: SessionId) -> OwnedMutexGuard<()> {
        let mutex = self.locks.entry(session_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone();
        mutex.lock_owned().await
    }
}
