use dashmap::{mapref::entry::Entry, DashMap};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Time-windowed "seen recently" set used to suppress repeated webhook work.
///
/// A key present in the store means an action for it started within its ttl and must not be
/// repeated. Implementations must make `try_acquire` a single atomic check-and-set; swapping in
/// an external cache for multi-instance deployments only requires another implementation.
pub trait DedupStore: Send + Sync {
    /// Insert `key` unless an unexpired entry exists. Returns false on a duplicate.
    fn try_acquire(&self, key: &str, ttl: Duration) -> bool;

    /// Remove `key` immediately so the action can be retried at once.
    fn release(&self, key: &str);

    fn contains(&self, key: &str) -> bool;

    /// Drop every expired entry, returning how many were removed.
    fn purge_expired(&self) -> usize;
}

#[derive(Debug, Clone, Copy)]
struct DedupEntry {
    inserted_at: Instant,
    ttl: Duration,
}

impl DedupEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

/// Process-local store backed by a sharded concurrent map. Expiry is checked lazily on every
/// access, and the maintenance sweeper reclaims entries nobody touches again.
#[derive(Debug, Default)]
pub struct InMemoryDedupStore {
    entries: DashMap<String, DedupEntry>,
}

impl InMemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DedupStore for InMemoryDedupStore {
    fn try_acquire(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let fresh = DedupEntry {
            inserted_at: now,
            ttl,
        };
        // The entry guard holds the shard lock across the check and the insert.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(fresh);
                    trace!(key, "dedup entry expired; re-acquired");
                    true
                } else {
                    debug!(key, "dedup hit");
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                true
            }
        }
    }

    fn release(&self, key: &str) {
        if self.entries.remove(key).is_some() {
            debug!(key, "dedup entry released");
        }
    }

    fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }
}

/// Key builders for the dedup domains.
pub mod keys {
    /// Outbound call initiation triggered by an agent's meeting-link message.
    pub fn outbound_request(customer_number: &str) -> String {
        format!("outbound-request:{customer_number}")
    }

    /// Outbound call leg placed once the agent joined the meeting.
    pub fn outbound_call(customer_number: &str) -> String {
        format!("outbound-call:{customer_number}")
    }

    pub fn meeting_link(conversation_id: u64) -> String {
        format!("meeting-link:{conversation_id}")
    }

    pub fn agent_joined(call_sid: &str) -> String {
        format!("agent-joined:{call_sid}")
    }

    pub fn call_status(call_sid: &str, status: &str) -> String {
        format!("call-status:{call_sid}:{status}")
    }

    pub fn recording_start(call_sid: &str) -> String {
        format!("recording-start:{call_sid}")
    }

    pub fn recording_post(recording_url: &str) -> String {
        format!("recording-post:{recording_url}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn second_acquire_within_ttl_is_rejected() {
        let store = InMemoryDedupStore::new();
        assert!(store.try_acquire("outbound-call:+15550001", Duration::from_secs(60)));
        assert!(!store.try_acquire("outbound-call:+15550001", Duration::from_secs(60)));
        assert!(store.try_acquire("outbound-call:+15550002", Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn entry_is_gone_after_ttl_without_release() {
        let store = InMemoryDedupStore::new();
        assert!(store.try_acquire("agent-joined:CA1", Duration::from_secs(10)));
        tokio::time::advance(Duration::from_millis(9_999)).await;
        assert!(store.contains("agent-joined:CA1"));
        tokio::time::advance(Duration::from_millis(2)).await;
        assert!(!store.contains("agent-joined:CA1"));
        assert!(store.try_acquire("agent-joined:CA1", Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn release_allows_immediate_retry() {
        let store = InMemoryDedupStore::new();
        assert!(store.try_acquire("k", Duration::from_secs(60)));
        store.release("k");
        assert!(store.try_acquire("k", Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired_entries() {
        let store = InMemoryDedupStore::new();
        store.try_acquire("short", Duration::from_secs(1));
        store.try_acquire("long", Duration::from_secs(30));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired(), 1);
        assert!(store.contains("long"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_acquire_yields_exactly_one_winner() {
        let store = Arc::new(InMemoryDedupStore::new());
        let attempts = (0..64).map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store.try_acquire("call-status:CA9:ringing", Duration::from_secs(10))
            })
        });
        let winners = join_all(attempts)
            .await
            .into_iter()
            .filter(|res| matches!(res, Ok(true)))
            .count();
        assert_eq!(winners, 1);
    }
}
