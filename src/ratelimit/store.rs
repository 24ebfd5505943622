//! Concurrent client state storage.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::state::ClientState;

/// Concurrent map from client identifier to that client's state.
///
/// The map is sharded, with one lock per shard. [`transact`](Self::transact)
/// holds the key's shard lock across the whole fetch-compute-persist sequence,
/// which is what makes an admission decision atomic per key. Clones share the
/// same underlying map.
#[derive(Debug, Clone, Default)]
pub struct ClientStore {
    clients: Arc<DashMap<String, ClientState>>,
}

impl ClientStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a record exists for `client_id`.
    pub fn has(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    /// A copy of the record for `client_id`, if any.
    pub fn get(&self, client_id: &str) -> Option<ClientState> {
        self.clients.get(client_id).map(|entry| *entry.value())
    }

    /// Insert or overwrite the record for `client_id`.
    pub fn put(&self, client_id: &str, state: ClientState) {
        self.clients.insert(client_id.to_owned(), state);
    }

    /// Remove the record for `client_id`, returning it.
    pub fn remove(&self, client_id: &str) -> Option<ClientState> {
        self.clients.remove(client_id).map(|(_, state)| state)
    }

    /// Atomically read, transform, and write back the record for `client_id`.
    ///
    /// `f` receives the current record (or `None` for an unknown client) and
    /// returns the record to store along with a result for the caller. No other
    /// caller can observe or modify this key while `f` runs, so `f` must not
    /// call back into the store.
    pub fn transact<T, F>(&self, client_id: &str, f: F) -> T
    where
        F: FnOnce(Option<&ClientState>) -> (ClientState, T),
    {
        match self.clients.entry(client_id.to_owned()) {
            Entry::Occupied(mut entry) => {
                let (next, out) = f(Some(entry.get()));
                entry.insert(next);
                out
            }
            Entry::Vacant(entry) => {
                let (next, out) = f(None);
                entry.insert(next);
                out
            }
        }
    }

    /// Remove every record whose last activity is older than `now - retention_secs`.
    ///
    /// Returns the number of records removed. This is never called on the
    /// admission path; see [`Sweeper`](super::Sweeper).
    pub fn cleanup_expired(&self, now: f64, retention_secs: f64) -> usize {
        let horizon = now - retention_secs;
        let mut removed = 0;

        self.clients.retain(|_, state| {
            let keep = state.last_activity() >= horizon;
            if !keep {
                removed += 1;
            }
            keep
        });

        debug!(
            removed = removed,
            remaining = self.clients.len(),
            "Expired client records removed"
        );
        removed
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no clients are tracked.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.clients.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::state::{FixedWindowState, TokenBucketState};
    use std::thread;

    fn fixed(window_start: u64, count: u64) -> ClientState {
        FixedWindowState {
            window_start,
            count,
        }
        .into()
    }

    #[test]
    fn test_unknown_client() {
        let store = ClientStore::new();
        assert!(!store.has("nobody"));
        assert_eq!(store.get("nobody"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_overwrites() {
        let store = ClientStore::new();
        store.put("a", fixed(0, 1));
        store.put("a", fixed(0, 2));

        assert!(store.has("a"));
        assert_eq!(store.get("a"), Some(fixed(0, 2)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_transact_creates_and_updates() {
        let store = ClientStore::new();

        let seen = store.transact("a", |current| (fixed(0, 1), current.copied()));
        assert_eq!(seen, None);

        let seen = store.transact("a", |current| (fixed(0, 2), current.copied()));
        assert_eq!(seen, Some(fixed(0, 1)));
        assert_eq!(store.get("a"), Some(fixed(0, 2)));
    }

    #[test]
    fn test_transact_is_atomic_per_key() {
        let store = ClientStore::new();
        let threads = 16;
        let per_thread = 500;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..per_thread {
                        store.transact("shared", |current| {
                            let count = match current {
                                Some(ClientState::FixedWindow(s)) => s.count,
                                _ => 0,
                            };
                            (fixed(0, count + 1), ())
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get("shared"), Some(fixed(0, threads * per_thread)));
    }

    #[test]
    fn test_cleanup_expired() {
        let store = ClientStore::new();
        store.put("old-window", fixed(100, 3));
        store.put("fresh-window", fixed(900, 3));
        store.put(
            "old-bucket",
            TokenBucketState {
                last_refill_time: 50.0,
                tokens: 1.0,
            }
            .into(),
        );
        store.put(
            "fresh-bucket",
            TokenBucketState {
                last_refill_time: 950.0,
                tokens: 1.0,
            }
            .into(),
        );

        let removed = store.cleanup_expired(1000.0, 300.0);

        assert_eq!(removed, 2);
        assert!(store.has("fresh-window"));
        assert!(store.has("fresh-bucket"));
        assert!(!store.has("old-window"));
        assert!(!store.has("old-bucket"));
    }

    #[test]
    fn test_remove_and_clear() {
        let store = ClientStore::new();
        store.put("a", fixed(0, 1));
        store.put("b", fixed(0, 1));

        assert_eq!(store.remove("a"), Some(fixed(0, 1)));
        assert_eq!(store.remove("a"), None);

        store.clear();
        assert!(store.is_empty());
    }
}
