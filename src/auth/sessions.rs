//! Per-account concurrent-session bookkeeping.
//!
//! Session identifiers are derived from the client fingerprint and wall-clock
//! time. They are bookkeeping keys, not capabilities: never treat one as a
//! bearer-equivalent credential.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use super::kv::{MemoryStore, StateStore};
use super::types::AccountId;

const DEFAULT_MAX_CONCURRENT_SESSIONS: usize = 5;

pub struct SessionTracker {
    store: Arc<dyn StateStore<AccountId, Vec<String>>>,
    max_concurrent: usize,
}

impl SessionTracker {
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Register a session for an account, evicting the oldest entries when
    /// the concurrency cap is exceeded.
    pub fn register(&self, account_id: &AccountId, fingerprint: &str) -> String {
        let session_id = derive_session_id(fingerprint);
        let max = self.max_concurrent;
        self.store.mutate(account_id, &mut |current| {
            let mut sessions = current.unwrap_or_default();
            sessions.push(session_id.clone());
            while sessions.len() > max {
                sessions.remove(0);
            }
            Some(sessions)
        });
        session_id
    }

    /// Remove one session (logout). The account entry disappears once its
    /// last session is revoked.
    pub fn revoke(&self, account_id: &AccountId, session_id: &str) {
        self.store.mutate(account_id, &mut |current| {
            let mut sessions = current?;
            sessions.retain(|existing| existing != session_id);
            if sessions.is_empty() {
                None
            } else {
                Some(sessions)
            }
        });
    }

    /// Active session count for diagnostics.
    #[must_use]
    pub fn count(&self, account_id: &AccountId) -> usize {
        self.store
            .get(account_id)
            .map_or(0, |sessions| sessions.len())
    }

    #[must_use]
    pub fn tracked_accounts(&self) -> usize {
        self.store.len()
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT_SESSIONS)
    }
}

/// Fingerprint + timestamp, hashed down to a compact opaque id. The
/// timestamp keeps ids distinct across registrations from one client.
fn derive_session_id(fingerprint: &str) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos());
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());
    hasher.update(timestamp.to_be_bytes());
    let digest = hasher.finalize();
    let mut id = String::with_capacity(24);
    for byte in digest.iter().take(12) {
        id.push_str(&format!("{byte:02x}"));
    }
    id
}
