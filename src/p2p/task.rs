//! The single task that owns the `Swarm` (module doc on [`crate`]: "the swarm itself is a
//! single-writer structure"). Every other piece of the node — the facade, the DAG layer, pinning —
//! reaches the network only by sending an [`IpfsEvent`] down an unbounded channel and, where a
//! reply makes sense, awaiting a oneshot back.
//!
//! Connection bookkeeping here is deliberately thin: [`crate::Ipfs::connect`] requires its address
//! to carry a trailing `/p2p/<peer id>` component precisely so a dial can be correlated with its
//! outcome without inventing a request-id scheme on top of what `libp2p` already reports per peer.

use crate::p2p::behaviour::BehaviourEvent;
use crate::p2p::{SwarmTypes, TSwarm};
use crate::peerstore::Peerstore;
use crate::repo::Repo;
use crate::{Block, Error};
use bitswap::{BitswapEvent, Priority};
use cid::Cid;
use fnv::FnvHashMap;
use futures::future::Either;
use libp2p::identify::IdentifyEvent;
use libp2p::multiaddr::Protocol;
use libp2p::swarm::SwarmEvent;
use libp2p::{Multiaddr, PeerId, Swarm};
use routing::RoutingEvent;
use std::convert::TryFrom;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Everything the facade can ask the background task to do. One variant per [`crate::Ipfs`] method
/// that ultimately needs the swarm; a handful (`HasBlock`, `Provide`) are fire-and-forget, the rest
/// carry a oneshot to report back on.
pub enum IpfsEvent {
    GetListeningAddresses(oneshot::Sender<Vec<Multiaddr>>),
    Connect(Multiaddr, oneshot::Sender<Result<(), Error>>),
    HasBlock(Block),
    WantBlock(Cid, Priority, oneshot::Sender<Block>),
    CancelBlock(Cid),
    FindProviders(Cid, usize, oneshot::Sender<Vec<PeerId>>),
    Provide(Cid),
}

/// A dial issued through [`IpfsEvent::Connect`], waiting for `libp2p` to report success or failure
/// for the peer it targets.
struct PendingConnect {
    peer_id: PeerId,
    responder: oneshot::Sender<Result<(), Error>>,
}

pub struct IpfsFuture<Types: SwarmTypes> {
    swarm: TSwarm<Types>,
    repo: Repo<Types>,
    from_facade: mpsc::UnboundedReceiver<IpfsEvent>,
    peerstore: Arc<Peerstore>,
    listening_addrs: Vec<Multiaddr>,
    pending_connects: Vec<PendingConnect>,
    find_providers_waiters: FnvHashMap<Cid, Vec<oneshot::Sender<Vec<PeerId>>>>,
}

impl<Types: SwarmTypes> IpfsFuture<Types> {
    pub fn new(
        swarm: TSwarm<Types>,
        repo: Repo<Types>,
        from_facade: mpsc::UnboundedReceiver<IpfsEvent>,
        peerstore: Arc<Peerstore>,
    ) -> Self {
        IpfsFuture {
            swarm,
            repo,
            from_facade,
            peerstore,
            listening_addrs: Vec::new(),
            pending_connects: Vec::new(),
            find_providers_waiters: FnvHashMap::default(),
        }
    }

    /// Drives the swarm and the facade's event channel until every `Ipfs` handle (and the sender
    /// half this task holds no clone of) has been dropped. Never returns an error: a peer or
    /// transport failure is reported through the relevant waiter, not by tearing down the node.
    pub async fn run(mut self) {
        loop {
            let facade = self.from_facade.recv();
            let swarm = self.swarm.next_event();
            futures::pin_mut!(facade);
            futures::pin_mut!(swarm);

            match futures::future::select(facade, swarm).await {
                Either::Left((Some(event), _)) => self.handle_facade_event(event).await,
                Either::Left((None, _)) => {
                    tracing::debug!("all Ipfs handles dropped, shutting down swarm task");
                    return;
                }
                Either::Right((event, _)) => self.handle_swarm_event(event).await,
            }
        }
    }

    async fn handle_facade_event(&mut self, event: IpfsEvent) {
        match event {
            IpfsEvent::GetListeningAddresses(responder) => {
                let _ = responder.send(self.listening_addrs.clone());
            }
            IpfsEvent::Connect(addr, responder) => self.start_connect(addr, responder),
            IpfsEvent::HasBlock(block) => self.swarm.has_block(block),
            IpfsEvent::WantBlock(cid, priority, responder) => {
                let inner = self.swarm.want_block(cid, priority);
                // `want_block` hands back a `futures`-oneshot receiver owned by `bitswap`; forward
                // it onto the `tokio`-oneshot the facade is actually waiting on.
                tokio::task::spawn(async move {
                    if let Ok(block) = inner.await {
                        let _ = responder.send(block);
                    }
                });
            }
            IpfsEvent::CancelBlock(cid) => self.swarm.cancel_want(&cid),
            IpfsEvent::FindProviders(cid, count, responder) => {
                self.find_providers_waiters
                    .entry(cid.clone())
                    .or_default()
                    .push(responder);
                self.swarm.find_providers(cid, count);
            }
            IpfsEvent::Provide(cid) => self.swarm.provide(cid),
        }
    }

    fn start_connect(&mut self, mut addr: Multiaddr, responder: oneshot::Sender<Result<(), Error>>) {
        let peer_id = match addr.pop() {
            Some(Protocol::P2p(hash)) => match PeerId::try_from(hash) {
                Ok(peer_id) => peer_id,
                Err(_) => {
                    let _ = responder.send(Err(Error::invalid("connect address's /p2p component is not a valid peer id")));
                    return;
                }
            },
            _ => {
                let _ = responder.send(Err(Error::invalid(
                    "connect address is missing a trailing /p2p/<peer id> component",
                )));
                return;
            }
        };

        self.peerstore.add_address(peer_id.clone(), addr.clone());

        if let Err(e) = Swarm::dial_addr(&mut self.swarm, addr) {
            let _ = responder.send(Err(Error::transient(format!("{:?}", e))));
            return;
        }

        self.pending_connects.push(PendingConnect { peer_id, responder });
    }

    fn resolve_connect(&mut self, peer: &PeerId, success: bool) {
        let (matching, rest): (Vec<_>, Vec<_>) = self
            .pending_connects
            .drain(..)
            .partition(|pc| &pc.peer_id == peer);
        self.pending_connects = rest;
        for pc in matching {
            let result = if success {
                Ok(())
            } else {
                Err(Error::DialFailure(peer.clone()))
            };
            let _ = pc.responder.send(result);
        }
    }

    async fn handle_swarm_event<E: std::fmt::Debug>(&mut self, event: SwarmEvent<BehaviourEvent, E>) {
        match event {
            SwarmEvent::Behaviour(event) => self.handle_behaviour_event(event).await,
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                self.swarm.update_routing_table(peer_id.clone());
                self.resolve_connect(&peer_id, true);
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                self.swarm.remove_peer(&peer_id);
            }
            SwarmEvent::UnreachableAddr { peer_id, .. } => {
                self.resolve_connect(&peer_id, false);
            }
            SwarmEvent::NewListenAddr(addr) => {
                if !self.listening_addrs.contains(&addr) {
                    self.listening_addrs.push(addr);
                }
            }
            SwarmEvent::ExpiredListenAddr(addr) => {
                self.listening_addrs.retain(|a| a != &addr);
            }
            _ => {}
        }
    }

    async fn handle_behaviour_event(&mut self, event: BehaviourEvent) {
        match event {
            BehaviourEvent::Bitswap(event) => self.handle_bitswap_event(event).await,
            BehaviourEvent::Routing(event) => self.handle_routing_event(event),
            BehaviourEvent::Identify(event) => self.handle_identify_event(*event),
            BehaviourEvent::Ping(_) => {}
        }
    }

    async fn handle_bitswap_event(&mut self, event: BitswapEvent) {
        match event {
            BitswapEvent::BlockRequested { peer, cid, .. } => match self.repo.get(&cid).await {
                Ok(Some(block)) => self.swarm.send_block(peer, block),
                Ok(None) => {}
                Err(e) => tracing::warn!("blockstore lookup for {} failed: {}", cid, e),
            },
            BitswapEvent::BlockReceived { block, .. } => {
                if let Err(e) = self.repo.put(block.clone()).await {
                    tracing::warn!("failed to persist received block {}: {}", block.cid(), e);
                    return;
                }
                self.swarm.has_block(block);
            }
            BitswapEvent::InvalidBlockReceived { peer, len } => {
                tracing::warn!("{} sent a {}-byte block matching none of our wants", peer, len);
            }
            BitswapEvent::NeedProviders { .. } => {
                // Already acted on inside `Behaviour::inject_event`; nothing left to do here.
            }
        }
    }

    fn handle_routing_event(&mut self, event: RoutingEvent) {
        match event {
            RoutingEvent::FoundProviders { key, providers } => {
                if let Some(waiters) = self.find_providers_waiters.remove(&key) {
                    for waiter in waiters {
                        let _ = waiter.send(providers.clone());
                    }
                }
            }
            RoutingEvent::FoundPeer { peer: Some(info), .. } => {
                for addr in info.addrs {
                    self.peerstore.add_address(info.id.clone(), addr);
                }
            }
            RoutingEvent::FoundPeer { peer: None, .. } => {}
            RoutingEvent::FoundValue { .. } => {}
            RoutingEvent::NeedAddress { peer } => {
                if let Some(addr) = self.peerstore.addresses(&peer).into_iter().next() {
                    let _ = Swarm::dial_addr(&mut self.swarm, addr);
                }
            }
        }
    }

    fn handle_identify_event(&mut self, event: IdentifyEvent) {
        if let IdentifyEvent::Received { peer_id, info, .. } = event {
            for addr in info.listen_addrs {
                self.peerstore.add_address(peer_id.clone(), addr);
            }
            self.swarm.update_routing_table(peer_id);
        }
    }
}

