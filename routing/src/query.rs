//! The iterative lookup (`query(target)` in the spec): seed with the closest known peers, fan out
//! `ALPHA` requests at a time, fold `closer_peers` back into the frontier, and stop once nothing
//! closer has turned up for a full round or the query-specific terminating condition fires.

use crate::kbucket::Key;
use crate::message::{PeerInfo, SignedRecord};
use libp2p_core::PeerId;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Parallelism factor: at most this many RPCs for a single query are in flight at once.
pub const ALPHA: usize = 3;

/// Soft wall-clock cap on an entire iterative lookup, regardless of how much progress it's making.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, PartialEq, Eq)]
pub enum QueryTarget {
    FindNode(PeerId),
    FindProviders { key: cid::Cid, count: usize },
    GetValue(Vec<u8>),
}

#[derive(Debug)]
pub enum QueryResult {
    Peer(Option<PeerInfo>),
    Providers(Vec<PeerId>),
    Value(Option<SignedRecord>),
}

struct Candidate {
    peer: PeerId,
    key: Key,
}

/// One in-progress iterative lookup.
pub struct Query {
    target: QueryTarget,
    target_key: Key,
    started_at: Instant,
    queried: HashSet<PeerId>,
    in_flight: HashSet<PeerId>,
    frontier: Vec<Candidate>,
    closest_seen: Vec<Candidate>,
    providers_found: Vec<PeerId>,
    value_found: Option<SignedRecord>,
    rounds_without_improvement: u32,
}

impl Query {
    pub fn new(target: QueryTarget, target_key: Key, seeds: Vec<PeerId>) -> Self {
        let frontier = seeds
            .into_iter()
            .map(|peer| {
                let key = Key::new(peer.as_bytes());
                Candidate { peer, key }
            })
            .collect();

        Query {
            target,
            target_key,
            started_at: Instant::now(),
            queried: HashSet::new(),
            in_flight: HashSet::new(),
            frontier,
            closest_seen: Vec::new(),
            providers_found: Vec::new(),
            value_found: None,
            rounds_without_improvement: 0,
        }
    }

    pub fn target(&self) -> &QueryTarget {
        &self.target
    }

    /// Pops up to `ALPHA - already_in_flight` peers from the frontier to dial next, closest first.
    pub fn next_batch(&mut self) -> Vec<PeerId> {
        if self.is_finished() {
            return Vec::new();
        }

        self.frontier.sort_by(|a, b| {
            a.key.distance(&self.target_key).cmp(&b.key.distance(&self.target_key))
        });

        let slots = ALPHA.saturating_sub(self.in_flight.len());
        let mut batch = Vec::new();

        while batch.len() < slots {
            let next = match self.frontier.iter().position(|c| {
                !self.queried.contains(&c.peer) && !self.in_flight.contains(&c.peer)
            }) {
                Some(idx) => self.frontier.remove(idx),
                None => break,
            };
            self.in_flight.insert(next.peer.clone());
            batch.push(next.peer.clone());
            self.closest_seen.push(Candidate {
                peer: next.peer.clone(),
                key: next.key,
            });
        }

        batch
    }

    /// Folds a successful RPC response back into the query: newly-seen peers extend the frontier,
    /// providers/values feed the terminating condition.
    pub fn on_closer_peers(&mut self, from: PeerId, closer: Vec<PeerInfo>) {
        self.in_flight.remove(&from);
        self.queried.insert(from);

        let mut improved = false;
        for info in closer {
            if self.queried.contains(&info.id) || self.in_flight.contains(&info.id) {
                continue;
            }
            if self.frontier.iter().any(|c| c.peer == info.id) {
                continue;
            }
            let key = Key::new(info.id.as_bytes());
            self.frontier.push(Candidate { peer: info.id, key });
            improved = true;
        }

        if improved {
            self.rounds_without_improvement = 0;
        } else {
            self.rounds_without_improvement += 1;
        }
    }

    pub fn on_providers(&mut self, from: PeerId, providers: Vec<PeerId>, closer: Vec<PeerInfo>) {
        self.providers_found.extend(providers);
        self.providers_found.sort_by_key(|p| p.to_string());
        self.providers_found.dedup();
        self.on_closer_peers(from, closer);
    }

    pub fn on_value(&mut self, from: PeerId, value: Option<SignedRecord>, closer: Vec<PeerInfo>) {
        if self.value_found.is_none() {
            self.value_found = value;
        }
        self.on_closer_peers(from, closer);
    }

    /// Marks a dialed peer as failed/unreachable: it's queried (won't be retried) but contributed
    /// nothing.
    pub fn on_failure(&mut self, peer: PeerId) {
        self.in_flight.remove(&peer);
        self.queried.insert(peer);
        self.rounds_without_improvement += 1;
    }

    pub fn is_finished(&self) -> bool {
        if self.started_at.elapsed() > LOOKUP_TIMEOUT {
            return true;
        }

        match &self.target {
            QueryTarget::FindNode(target) => self
                .closest_seen
                .iter()
                .any(|c| &c.peer == target)
                || self.exhausted(),
            QueryTarget::FindProviders { count, .. } => {
                self.providers_found.len() >= *count || self.exhausted()
            }
            QueryTarget::GetValue(_) => self.value_found.is_some() || self.exhausted(),
        }
    }

    /// True once the closest `K_VALUE` candidates have all been queried with no improvement seen
    /// for a full round, i.e. there is nothing left to usefully dial.
    fn exhausted(&self) -> bool {
        let no_pending = self.frontier.iter().all(|c| self.queried.contains(&c.peer));
        (no_pending && self.in_flight.is_empty())
            || self.rounds_without_improvement >= crate::kbucket::K_VALUE as u32
    }

    pub fn into_result(mut self) -> QueryResult {
        match self.target {
            QueryTarget::FindNode(target) => {
                self.closest_seen.sort_by_key(|c| c.key.distance(&self.target_key));
                let found = self.closest_seen.into_iter().find(|c| c.peer == target);
                QueryResult::Peer(found.map(|c| PeerInfo {
                    id: c.peer,
                    addrs: Vec::new(),
                }))
            }
            QueryTarget::FindProviders { .. } => QueryResult::Providers(self.providers_found),
            QueryTarget::GetValue(_) => QueryResult::Value(self.value_found),
        }
    }

    /// The `K_VALUE` peers closest to the target seen so far, for callers (like `FIND_NODE`) that
    /// want the whole closest-set rather than a single match.
    pub fn closest_k(&self) -> Vec<PeerId> {
        let mut all = self.closest_seen.iter().collect::<Vec<_>>();
        all.sort_by_key(|c| c.key.distance(&self.target_key));
        all.into_iter()
            .take(crate::kbucket::K_VALUE)
            .map(|c| c.peer.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_node_terminates_when_target_located() {
        let target = PeerId::random();
        let target_key = Key::new(target.as_bytes());
        let seed = PeerId::random();

        let mut query = Query::new(QueryTarget::FindNode(target.clone()), target_key, vec![seed.clone()]);
        assert!(!query.is_finished());

        let batch = query.next_batch();
        assert_eq!(batch, vec![seed.clone()]);

        query.on_closer_peers(
            seed,
            vec![PeerInfo {
                id: target.clone(),
                addrs: vec![],
            }],
        );

        assert!(query.is_finished());
        match query.into_result() {
            QueryResult::Peer(Some(info)) => assert_eq!(info.id, target),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn exhausted_query_with_no_seeds_finishes_immediately() {
        let target_key = Key::new(b"anything");
        let mut query = Query::new(
            QueryTarget::FindProviders {
                key: cid::Cid::new_v1(cid::Codec::Raw, multihash::Sha2_256::digest(b"k")),
                count: 5,
            },
            target_key,
            vec![],
        );
        assert!(query.next_batch().is_empty());
        assert!(query.is_finished());
    }
}

impl std::fmt::Debug for QueryTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryTarget::FindNode(p) => write!(f, "FindNode({})", p),
            QueryTarget::FindProviders { key, count } => {
                write!(f, "FindProviders({}, count={})", key, count)
            }
            QueryTarget::GetValue(k) => write!(f, "GetValue({} bytes)", k.len()),
        }
    }
}
