//! The routing overlay wired as a `libp2p` [`NetworkBehaviour`]: owns the single k-bucket table,
//! the provider store, and whatever iterative lookups ([`crate::query::Query`]) are currently in
//! flight, and turns their RPC traffic into `/ipfs/kad/1.0.0` wire messages.
//!
//! Like [`bitswap::Bitswap`], this crate never touches a blockstore or peerstore directly: the
//! composing behaviour in the `ipfs` crate reacts to [`RoutingEvent`] to actually dial peers or
//! hand discovered providers to the exchange engine.

use crate::kbucket::{Key, RoutingTable, UpdateOutcome};
use crate::message::{KadMessage, PeerInfo};
use crate::protocol::KadConfig;
use crate::provider::ProviderStore;
use crate::query::{Query, QueryResult, QueryTarget};
use cid::Cid;
use fnv::FnvHashMap;
use libp2p_core::{Multiaddr, PeerId};
use libp2p_swarm::{
    NetworkBehaviour, NetworkBehaviourAction, OneShotHandler, PollParameters, ProtocolsHandler,
};
use std::collections::VecDeque;
use std::task::{Context, Poll};

/// Once a `provide(key)` lookup locates the closest peers, this is carried alongside the query so
/// `ADD_PROVIDER` can be sent to them when it completes.
struct ActiveQuery {
    query: Query,
    announce: Option<Cid>,
}

#[derive(Debug)]
pub enum RoutingEvent {
    /// A `FIND_PROVIDERS` query completed (possibly with zero providers).
    FoundProviders { key: Cid, providers: Vec<PeerId> },
    /// A `FIND_NODE` query completed; `None` if the target was never located.
    FoundPeer { target: PeerId, peer: Option<PeerInfo> },
    /// A `GET_VALUE` query completed; `None` if no record was found.
    FoundValue { key: Vec<u8>, record: Option<crate::message::SignedRecord> },
    /// The local table learned of a peer it has no address for; the composing behaviour should
    /// resolve one (e.g. from its peerstore) before any RPC can be dialed to it.
    NeedAddress { peer: PeerId },
}

pub struct Routing {
    local_key: Key,
    table: RoutingTable<PeerId>,
    providers: ProviderStore,
    /// Keys this node itself holds and wants to be found providing.
    locally_provided: Vec<Cid>,
    queries: Vec<(u64, ActiveQuery)>,
    next_query_id: u64,
    /// Which in-flight query a peer's next inbound response should be folded into. A peer is
    /// dialed for at most one RPC at a time across all queries, so this is unambiguous.
    awaiting_response: FnvHashMap<PeerId, u64>,
    pending_out: FnvHashMap<PeerId, KadMessage>,
    events: VecDeque<NetworkBehaviourAction<KadMessage, RoutingEvent>>,
}

impl Routing {
    pub fn new(local_peer_id: PeerId) -> Self {
        Routing {
            local_key: Key::new(local_peer_id.as_bytes()),
            table: RoutingTable::new(Key::new(local_peer_id.as_bytes())),
            providers: ProviderStore::new(),
            locally_provided: Vec::new(),
            queries: Vec::new(),
            next_query_id: 0,
            awaiting_response: FnvHashMap::default(),
            pending_out: FnvHashMap::default(),
            events: VecDeque::new(),
        }
    }

    /// Called on every valid inbound message from `peer` (spec.md §4.5: "`Update(peer)` is
    /// invoked opportunistically on every valid inbound message", not only explicit pings).
    pub fn update(&mut self, peer: PeerId) {
        let key = Key::new(peer.as_bytes());
        if let UpdateOutcome::PingOldest { least_recently_seen } = self.table.update(peer.clone(), key) {
            // We don't have a liveness check wired up to the handler from here; conservatively
            // assume the oldest peer is still alive and drop the newcomer. A composing behaviour
            // that wants eviction-on-failure can call `replace_if_dead` directly once it has
            // confirmed the oldest peer is unreachable.
            let _ = least_recently_seen;
        }
    }

    pub fn remove_peer(&mut self, peer: &PeerId) {
        self.table.remove(peer, Key::new(peer.as_bytes()));
    }

    pub fn table(&self) -> &RoutingTable<PeerId> {
        &self.table
    }

    fn start_query(&mut self, target: QueryTarget, announce: Option<Cid>) -> u64 {
        let target_key = match &target {
            QueryTarget::FindNode(p) => Key::new(p.as_bytes()),
            QueryTarget::FindProviders { key, .. } => Key::new(&key.to_bytes()),
            QueryTarget::GetValue(k) => Key::new(k),
        };

        let seeds = self.table.closest(&target_key, crate::query::ALPHA * 2);
        let query = Query::new(target, target_key, seeds);

        let id = self.next_query_id;
        self.next_query_id += 1;
        self.queries.push((id, ActiveQuery { query, announce }));
        self.drive_query(id);
        id
    }

    pub fn find_node(&mut self, target: PeerId) -> u64 {
        self.start_query(QueryTarget::FindNode(target), None)
    }

    pub fn find_providers(&mut self, key: Cid, count: usize) -> u64 {
        self.start_query(QueryTarget::FindProviders { key, count }, None)
    }

    pub fn get_value(&mut self, key: Vec<u8>) -> u64 {
        self.start_query(QueryTarget::GetValue(key), None)
    }

    /// Announces a locally-held key: records it for republish and kicks off a `FIND_NODE`-style
    /// lookup whose closest peers will each receive an `ADD_PROVIDER` once it completes.
    pub fn provide(&mut self, key: Cid) {
        if !self.locally_provided.contains(&key) {
            self.locally_provided.push(key.clone());
        }
        let target_key = Key::new(&key.to_bytes());
        let seeds = self.table.closest(&target_key, crate::query::ALPHA * 2);
        let fake_target = fake_peer_id_for_key(&key);
        let query = Query::new(QueryTarget::FindNode(fake_target), target_key, seeds);
        let id = self.next_query_id;
        self.next_query_id += 1;
        self.queries.push((id, ActiveQuery { query, announce: Some(key) }));
        self.drive_query(id);
    }

    pub fn locally_provided(&self) -> &[Cid] {
        &self.locally_provided
    }

    /// Records an inbound `ADD_PROVIDER`.
    pub fn add_provider(&mut self, key: Cid, peer: PeerId) {
        self.providers.add(key, peer);
    }

    pub fn providers_for(&self, key: &Cid) -> Vec<PeerId> {
        self.providers.get(key)
    }

    pub fn evict_expired_providers(&mut self) {
        self.providers.evict_expired();
    }

    fn drive_query(&mut self, id: u64) {
        let pos = match self.queries.iter().position(|(qid, _)| *qid == id) {
            Some(p) => p,
            None => return,
        };

        if self.queries[pos].1.query.is_finished() {
            self.finish_query(pos);
            return;
        }

        let batch = self.queries[pos].1.query.next_batch();
        for peer in batch {
            self.awaiting_response.insert(peer.clone(), id);
            let message = match self.queries[pos].1.query.target() {
                QueryTarget::FindNode(target) => KadMessage::FindNode {
                    target: target.clone(),
                    closer_peers: Vec::new(),
                },
                QueryTarget::FindProviders { key, .. } => KadMessage::GetProviders {
                    key: key.clone(),
                    providers: Vec::new(),
                    closer_peers: Vec::new(),
                },
                QueryTarget::GetValue(key) => KadMessage::GetValue {
                    key: key.clone(),
                    record: None,
                    closer_peers: Vec::new(),
                },
            };
            self.pending_out.insert(peer, message);
        }

        if self.queries[pos].1.query.is_finished() {
            self.finish_query(pos);
        }
    }

    fn finish_query(&mut self, pos: usize) {
        let (_id, active) = self.queries.remove(pos);

        if let Some(key) = active.announce {
            for peer in active.query.closest_k() {
                self.pending_out.entry(peer).or_insert_with(|| KadMessage::AddProvider {
                    key: key.clone(),
                    provider: PeerInfo { id: PeerId::random(), addrs: Vec::new() },
                });
            }
            return;
        }

        let target = active.query.target().clone();
        match active.query.into_result() {
            QueryResult::Peer(peer) => {
                let target = match &target {
                    QueryTarget::FindNode(p) => p.clone(),
                    _ => unreachable!("QueryResult::Peer only comes from a FindNode query"),
                };
                self.events.push_back(NetworkBehaviourAction::GenerateEvent(
                    RoutingEvent::FoundPeer { target, peer },
                ));
            }
            QueryResult::Providers(providers) => {
                let key = match target {
                    QueryTarget::FindProviders { key, .. } => key,
                    _ => unreachable!("QueryResult::Providers only comes from a FindProviders query"),
                };
                self.events.push_back(NetworkBehaviourAction::GenerateEvent(
                    RoutingEvent::FoundProviders { key, providers },
                ));
            }
            QueryResult::Value(record) => {
                let key = match target {
                    QueryTarget::GetValue(key) => key,
                    _ => unreachable!("QueryResult::Value only comes from a GetValue query"),
                };
                self.events.push_back(NetworkBehaviourAction::GenerateEvent(
                    RoutingEvent::FoundValue { key, record },
                ));
            }
        }
    }
}

impl NetworkBehaviour for Routing {
    // The outbound protocol is the message itself (see `protocol.rs`'s `OutboundUpgrade for
    // KadMessage`): `OneShotHandler`'s `InEvent` is its outbound-protocol type parameter, and
    // `NotifyHandler { event, .. }` below hands it a `KadMessage` to send, not a `KadConfig`.
    type ProtocolsHandler = OneShotHandler<KadConfig, KadMessage, KadMessage>;
    type OutEvent = RoutingEvent;

    fn new_handler(&mut self) -> Self::ProtocolsHandler {
        Default::default()
    }

    fn addresses_of_peer(&mut self, _peer_id: &PeerId) -> Vec<Multiaddr> {
        Vec::new()
    }

    fn inject_connected(&mut self, peer_id: &PeerId) {
        self.update(peer_id.clone());
    }

    fn inject_disconnected(&mut self, peer_id: &PeerId) {
        self.awaiting_response.remove(peer_id);
        self.pending_out.remove(peer_id);
    }

    fn inject_event(
        &mut self,
        peer_id: PeerId,
        _connection: libp2p_core::connection::ConnectionId,
        message: KadMessage,
    ) {
        self.update(peer_id.clone());

        let query_id = match self.awaiting_response.remove(&peer_id) {
            Some(id) => id,
            None => return, // unsolicited message; already folded into the table above
        };

        let pos = match self.queries.iter().position(|(qid, _)| *qid == query_id) {
            Some(p) => p,
            None => return,
        };

        match message {
            KadMessage::FindNode { closer_peers, .. } => {
                self.queries[pos].1.query.on_closer_peers(peer_id, closer_peers);
            }
            KadMessage::GetProviders { providers, closer_peers, .. } => {
                let peers = providers.into_iter().map(|p| p.id).collect();
                self.queries[pos].1.query.on_providers(peer_id, peers, closer_peers);
            }
            KadMessage::GetValue { record, closer_peers, .. } => {
                self.queries[pos].1.query.on_value(peer_id, record, closer_peers);
            }
            KadMessage::AddProvider { key, provider } => {
                self.providers.add(key, provider.id);
            }
            KadMessage::PutValue { .. } | KadMessage::Ping => {}
        }

        self.drive_query(query_id);
    }

    fn poll(
        &mut self,
        _cx: &mut Context<'_>,
        _params: &mut impl PollParameters,
    ) -> Poll<NetworkBehaviourAction<KadMessage, RoutingEvent>> {
        if let Some(event) = self.events.pop_front() {
            return Poll::Ready(event);
        }

        if let Some(peer) = self.pending_out.keys().next().cloned() {
            let message = self.pending_out.remove(&peer).expect("key was just observed");
            return Poll::Ready(NetworkBehaviourAction::NotifyHandler {
                peer_id: peer,
                handler: libp2p_swarm::NotifyHandler::Any,
                event: message,
            });
        }

        Poll::Pending
    }
}

/// `QueryTarget::FindNode` carries a `PeerId` target; reusing it to drive a provide-announcement
/// lookup (which is really "find the peers closest to this *key*") needs a placeholder `PeerId`
/// purely so the existing query machinery can run unmodified. It is never compared against a real
/// peer: `finish_query` branches on `active.announce` before the `FindNode` result is inspected.
fn fake_peer_id_for_key(key: &Cid) -> PeerId {
    // A multihash-shaped PeerId constructed from the key's own hash; never dialed or compared.
    PeerId::from_bytes(key.hash().as_bytes().to_vec()).unwrap_or_else(|_| PeerId::random())
}
