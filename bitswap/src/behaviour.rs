//! The Bitswap exchange engine: per-peer want-lists, ledgers, delivery and cancellation, wired as
//! a `libp2p` [`NetworkBehaviour`].
//!
//! Deliberately decoupled from any blockstore: this crate only knows how to track who wants what
//! and whether the debt-ratio strategy currently allows serving them. The composing behaviour in
//! the `ipfs` crate reacts to [`BitswapEvent::BlockRequested`]/[`BitswapEvent::BlockReceived`] to
//! actually touch the local blockstore.

use crate::block::Block;
use crate::ledger::{Ledger, LocalWantlist, Priority};
use crate::message::{BitswapMessage, Entry};
use crate::protocol::BitswapConfig;
use crate::strategy::{DebtRatioStrategy, Strategy};
use cid::Cid;
use fnv::FnvHashMap;
use futures::channel::oneshot;
use libp2p_core::{Multiaddr, PeerId};
use libp2p_swarm::{
    NetworkBehaviour, NetworkBehaviourAction, OneShotHandler, PollParameters, ProtocolsHandler,
};
use std::collections::VecDeque;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// How long a cancellation waits, after the last local waiter drops, before it is actually
/// broadcast to peers — avoids thrashing the network on rapid get/cancel cycles.
const CANCEL_DEBOUNCE: Duration = Duration::from_millis(200);

/// Default number of providers to fan a want out to.
pub const DEFAULT_PROVIDER_FANOUT: usize = 20;

#[derive(Debug)]
pub enum BitswapEvent {
    /// A connected peer wants `cid` and our strategy currently allows serving them if we have it;
    /// the composing behaviour should look the key up in its blockstore and call
    /// [`Bitswap::send_block`] if found.
    BlockRequested { peer: PeerId, cid: Cid, priority: Priority },
    /// A peer sent us a block that hashed correctly. The composing behaviour should persist it and
    /// call [`Bitswap::has_block`].
    BlockReceived { peer: PeerId, block: Block },
    /// A peer sent us a block payload that doesn't hash to any key we currently want. Bitswap
    /// 1.0.0 blocks carry no CID on the wire, so this is the only mismatch this layer can detect:
    /// either the bytes are corrupt, or the block answers a want we've already canceled.
    InvalidBlockReceived { peer: PeerId, len: usize },
    /// We have no local or session-known way to reach any peer for `cid`; the composing behaviour
    /// should ask Routing for providers and `connect` to them.
    NeedProviders { cid: Cid },
}

pub struct Bitswap<S: Strategy = DebtRatioStrategy> {
    strategy: S,
    local_wants: LocalWantlist,
    ledgers: FnvHashMap<PeerId, Ledger>,
    waiters: FnvHashMap<Cid, Vec<oneshot::Sender<Block>>>,
    pending_cancel: FnvHashMap<Cid, Instant>,
    pending_out: FnvHashMap<PeerId, BitswapMessage>,
    events: VecDeque<NetworkBehaviourAction<BitswapMessage, BitswapEvent>>,
}

impl<S: Strategy + Default> Default for Bitswap<S> {
    fn default() -> Self {
        Bitswap::new(S::default())
    }
}

impl<S: Strategy> Bitswap<S> {
    pub fn new(strategy: S) -> Self {
        Bitswap {
            strategy,
            local_wants: LocalWantlist::default(),
            ledgers: FnvHashMap::default(),
            waiters: FnvHashMap::default(),
            pending_cancel: FnvHashMap::default(),
            pending_out: FnvHashMap::default(),
            events: VecDeque::new(),
        }
    }

    /// Registers interest in `cid`; returns a receiver resolved the first time the block becomes
    /// available locally. Deduplicates: a second `want_block` for a key already wanted just
    /// attaches another waiter to the same in-flight fetch.
    pub fn want_block(&mut self, cid: Cid, priority: Priority) -> oneshot::Receiver<Block> {
        let (tx, rx) = oneshot::channel();
        self.waiters.entry(cid.clone()).or_default().push(tx);

        if !self.local_wants.contains(&cid) {
            self.local_wants.insert(cid.clone(), priority);
            self.broadcast_want(&cid, priority);
            self.events
                .push_back(NetworkBehaviourAction::GenerateEvent(
                    BitswapEvent::NeedProviders { cid },
                ));
        }

        rx
    }

    /// Called when the last waiter for `cid` is gone (its cancellation token fired). Debounces the
    /// actual network broadcast.
    pub fn cancel_want(&mut self, cid: &Cid) {
        if self.waiters.get(cid).map(Vec::is_empty).unwrap_or(true) {
            self.pending_cancel.insert(cid.clone(), Instant::now() + CANCEL_DEBOUNCE);
        }
    }

    /// Announces a locally-ingested or newly-received block: resolves waiters, cancels the want
    /// from peers, and serves it to any peer whose want-list we know includes it (subject to
    /// strategy).
    pub fn has_block(&mut self, block: Block) {
        let cid = block.cid().clone();
        self.local_wants.remove(&cid);
        self.pending_cancel.remove(&cid);

        if let Some(waiters) = self.waiters.remove(&cid) {
            for tx in waiters {
                let _ = tx.send(block.clone());
            }
            self.broadcast_cancel(&cid);
        }

        let mut to_serve = Vec::new();
        for (peer, ledger) in self.ledgers.iter() {
            if ledger.wants(&cid) && self.strategy.should_send(&ledger.stats()) {
                to_serve.push(peer.clone());
            }
        }
        for peer in to_serve {
            self.send_block(peer, block.clone());
        }
    }

    /// Queues `block` for delivery to `peer`, charging the outbound byte count against their
    /// ledger.
    pub fn send_block(&mut self, peer: PeerId, block: Block) {
        let bytes = block.data().len() as u64;
        let ledger = self.ledgers.entry(peer.clone()).or_default();
        ledger.record_sent(bytes);
        ledger.forget_want(block.cid());

        self.pending_out
            .entry(peer)
            .or_insert_with(|| BitswapMessage::new(false))
            .add_block(block);
    }

    fn broadcast_want(&mut self, cid: &Cid, priority: Priority) {
        let peers: Vec<_> = self.ledgers.keys().cloned().collect();
        for peer in peers {
            self.pending_out
                .entry(peer)
                .or_insert_with(|| BitswapMessage::new(false))
                .want_block(cid.clone(), priority);
        }
    }

    fn broadcast_cancel(&mut self, cid: &Cid) {
        let peers: Vec<_> = self.ledgers.keys().cloned().collect();
        for peer in peers {
            self.pending_out
                .entry(peer)
                .or_insert_with(|| BitswapMessage::new(false))
                .cancel_block(cid.clone());
        }
    }

    fn flush_debounced_cancels(&mut self) {
        let now = Instant::now();
        let ready: Vec<Cid> = self
            .pending_cancel
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(cid, _)| cid.clone())
            .collect();
        for cid in ready {
            self.pending_cancel.remove(&cid);
            self.broadcast_cancel(&cid);
        }
    }

    /// Finds which, if any, of our own currently-wanted keys `data` is the block for. Bitswap
    /// 1.0.0 never sends a block's CID alongside its bytes (spec.md §6), so recognizing it means
    /// hashing `data` under each candidate want's own hash algorithm and looking for a match,
    /// rather than decoding a CID straight out of the payload.
    fn resolve_wanted(&self, data: &[u8]) -> Option<Cid> {
        self.local_wants
            .iter()
            .map(|(cid, _)| cid)
            .find(|cid| Block::hash_matches(cid, data))
            .cloned()
    }

    fn session_snapshot_for(&mut self, peer: &PeerId) -> BitswapMessage {
        let ledger = self.ledgers.entry(peer.clone()).or_default();
        if ledger.needs_full_snapshot() {
            ledger.mark_full_snapshot_sent();
            self.local_wants.snapshot()
        } else {
            BitswapMessage::new(false)
        }
    }
}

impl<S: Strategy> NetworkBehaviour for Bitswap<S> {
    // The outbound protocol is the message itself (see `protocol.rs`'s `OutboundUpgrade for
    // BitswapMessage`): `OneShotHandler`'s `InEvent` is its outbound-protocol type parameter, and
    // `NotifyHandler { event, .. }` below hands it a `BitswapMessage` to send, not a `BitswapConfig`.
    type ProtocolsHandler = OneShotHandler<BitswapConfig, BitswapMessage, BitswapMessage>;
    type OutEvent = BitswapEvent;

    fn new_handler(&mut self) -> Self::ProtocolsHandler {
        Default::default()
    }

    fn addresses_of_peer(&mut self, _peer_id: &PeerId) -> Vec<Multiaddr> {
        Vec::new()
    }

    fn inject_connected(&mut self, peer_id: &PeerId) {
        self.ledgers.entry(peer_id.clone()).or_default();
        // New session: send the full local want-list once here, deltas thereafter.
        let snapshot = self.session_snapshot_for(peer_id);
        if !snapshot.is_empty() {
            self.pending_out.insert(peer_id.clone(), snapshot);
        }
    }

    fn inject_disconnected(&mut self, peer_id: &PeerId) {
        self.ledgers.remove(peer_id);
        self.pending_out.remove(peer_id);
    }

    fn inject_event(
        &mut self,
        peer_id: PeerId,
        _connection: libp2p_core::connection::ConnectionId,
        message: BitswapMessage,
    ) {
        let bytes = message.encoded_len_estimate() as u64;
        let wantlist = message.wantlist().to_vec();
        let full = message.is_full();

        {
            let ledger = self.ledgers.entry(peer_id.clone()).or_default();
            ledger.record_received(bytes);
            ledger.receive_wantlist(full, &wantlist);
        }

        for entry in &wantlist {
            if entry.cancel {
                continue;
            }
            let stats = self.ledgers[&peer_id].stats();
            if self.strategy.should_send(&stats) {
                self.events
                    .push_back(NetworkBehaviourAction::GenerateEvent(
                        BitswapEvent::BlockRequested {
                            peer: peer_id.clone(),
                            cid: entry.cid.clone(),
                            priority: entry.priority,
                        },
                    ));
            }
        }

        for data in message.blocks() {
            match self.resolve_wanted(data) {
                Some(cid) => {
                    self.events
                        .push_back(NetworkBehaviourAction::GenerateEvent(
                            BitswapEvent::BlockReceived {
                                peer: peer_id.clone(),
                                block: Block::new(data.clone(), cid),
                            },
                        ));
                }
                None => {
                    self.events
                        .push_back(NetworkBehaviourAction::GenerateEvent(
                            BitswapEvent::InvalidBlockReceived {
                                peer: peer_id.clone(),
                                len: data.len(),
                            },
                        ));
                }
            }
        }
    }

    fn poll(
        &mut self,
        _cx: &mut Context<'_>,
        _params: &mut impl PollParameters,
    ) -> Poll<NetworkBehaviourAction<BitswapMessage, BitswapEvent>> {
        self.flush_debounced_cancels();

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
