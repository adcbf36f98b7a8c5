//! The provider store: `key -> set of (peer, expiry)`, answering `FIND_PROVIDERS` and backing the
//! republish loop. LRU-evicted on key count, not on a timer — the timer-driven part is expiry,
//! handled separately by [`ProviderStore::evict_expired`].

use cid::Cid;
use fnv::FnvHashMap;
use libp2p_core::PeerId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// How long a provider record is valid for after being recorded, absent a republish.
pub const TTL_PROVIDE: Duration = Duration::from_secs(24 * 60 * 60);

/// How often the local node re-announces every key it provides.
pub const REPUBLISH_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

/// Upper bound on distinct keys tracked at once; the least-recently-touched key is evicted first
/// when a new key would exceed this.
const MAX_TRACKED_KEYS: usize = 8192;

struct KeyEntry {
    providers: HashMap<PeerId, Instant>,
    last_touched: Instant,
}

#[derive(Default)]
pub struct ProviderStore {
    keys: FnvHashMap<Cid, KeyEntry>,
}

impl ProviderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `peer` provides `key`, replacing any prior expiry for that pair.
    pub fn add(&mut self, key: Cid, peer: PeerId) {
        self.evict_lru_if_needed(&key);

        let now = Instant::now();
        let entry = self.keys.entry(key).or_insert_with(|| KeyEntry {
            providers: HashMap::new(),
            last_touched: now,
        });
        entry.providers.insert(peer, now + TTL_PROVIDE);
        entry.last_touched = now;
    }

    /// Unexpired providers currently on record for `key`.
    pub fn get(&self, key: &Cid) -> Vec<PeerId> {
        let now = Instant::now();
        self.keys
            .get(key)
            .map(|e| {
                e.providers
                    .iter()
                    .filter(|(_, expiry)| **expiry > now)
                    .map(|(p, _)| p.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drops every provider record (across all keys) whose expiry has passed. Call periodically;
    /// does not run automatically since this type has no implicit timer of its own.
    pub fn evict_expired(&mut self) {
        let now = Instant::now();
        self.keys.retain(|_, entry| {
            entry.providers.retain(|_, expiry| *expiry > now);
            !entry.providers.is_empty()
        });
    }

    fn evict_lru_if_needed(&mut self, incoming: &Cid) {
        if self.keys.len() < MAX_TRACKED_KEYS || self.keys.contains_key(incoming) {
            return;
        }
        if let Some(oldest) = self
            .keys
            .iter()
            .min_by_key(|(_, e)| e.last_touched)
            .map(|(k, _)| k.clone())
        {
            self.keys.remove(&oldest);
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cid::Codec;
    use multihash::Sha2_256;

    fn cid_of(bytes: &[u8]) -> Cid {
        Cid::new_v1(Codec::Raw, Sha2_256::digest(bytes))
    }

    #[test]
    fn add_then_get() {
        let mut store = ProviderStore::new();
        let key = cid_of(b"k");
        let peer = PeerId::random();

        store.add(key.clone(), peer.clone());
        assert_eq!(store.get(&key), vec![peer]);
    }

    #[test]
    fn evict_expired_drops_stale_keys() {
        let mut store = ProviderStore::new();
        let key = cid_of(b"k");
        let peer = PeerId::random();
        store.add(key.clone(), peer);

        // Manually force expiry in the past to exercise eviction without sleeping real time.
        if let Some(entry) = store.keys.get_mut(&key) {
            for expiry in entry.providers.values_mut() {
                *expiry = Instant::now() - Duration::from_secs(1);
            }
        }

        store.evict_expired();
        assert!(store.get(&key).is_empty());
        assert!(store.is_empty());
    }
}
