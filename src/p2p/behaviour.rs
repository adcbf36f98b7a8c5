//! Combines the exchange, routing, identify and ping protocols into a single `NetworkBehaviour`
//! the swarm drives. Event handling (storing received blocks, feeding routing answers back to
//! bitswap's `NeedProviders`, updating the peerstore) happens one level up, in the background task
//! `Ipfs` owns — this module only wires the protocols together and surfaces their raw events.

use crate::p2p::SwarmOptions;
use crate::p2p::SwarmTypes;
use bitswap::{Bitswap, BitswapEvent, DebtRatioStrategy};
use libp2p::identify::{Identify, IdentifyEvent};
use libp2p::ping::{Ping, PingConfig, PingEvent};
use libp2p::swarm::NetworkBehaviourEventProcess;
use libp2p::NetworkBehaviour;
use routing::{Routing, RoutingEvent};
use std::collections::VecDeque;
use std::marker::PhantomData;

/// The union of everything a sub-protocol can report. The background task's poll loop matches on
/// this to decide what, if anything, needs to happen at the node level.
#[derive(Debug)]
pub enum BehaviourEvent {
    Bitswap(BitswapEvent),
    Routing(RoutingEvent),
    Identify(Box<IdentifyEvent>),
    Ping(PingEvent),
}

impl From<BitswapEvent> for BehaviourEvent {
    fn from(e: BitswapEvent) -> Self {
        BehaviourEvent::Bitswap(e)
    }
}

impl From<RoutingEvent> for BehaviourEvent {
    fn from(e: RoutingEvent) -> Self {
        BehaviourEvent::Routing(e)
    }
}

impl From<IdentifyEvent> for BehaviourEvent {
    fn from(e: IdentifyEvent) -> Self {
        BehaviourEvent::Identify(Box::new(e))
    }
}

impl From<PingEvent> for BehaviourEvent {
    fn from(e: PingEvent) -> Self {
        BehaviourEvent::Ping(e)
    }
}

#[derive(NetworkBehaviour)]
#[behaviour(event_process = true)]
#[behaviour(out_event = "BehaviourEvent")]
pub struct Behaviour<T: SwarmTypes> {
    bitswap: Bitswap<DebtRatioStrategy>,
    routing: Routing,
    identify: Identify,
    ping: Ping,

    #[behaviour(ignore)]
    events: VecDeque<BehaviourEvent>,
    #[behaviour(ignore)]
    _marker: PhantomData<T>,
}

impl<T: SwarmTypes> Behaviour<T> {
    /// `NeedProviders` is the one place bitswap reaches sideways into routing: it cannot dial
    /// anyone for a wanted key until routing names candidates.
    pub fn find_providers(&mut self, key: cid::Cid, count: usize) -> u64 {
        self.routing.find_providers(key, count)
    }

    pub fn want_block(&mut self, key: cid::Cid, priority: bitswap::Priority) -> futures::channel::oneshot::Receiver<bitswap::Block> {
        self.bitswap.want_block(key, priority)
    }

    pub fn cancel_want(&mut self, key: &cid::Cid) {
        self.bitswap.cancel_want(key);
    }

    pub fn send_block(&mut self, peer: libp2p::PeerId, block: bitswap::Block) {
        self.bitswap.send_block(peer, block);
    }

    pub fn has_block(&mut self, block: bitswap::Block) {
        self.bitswap.has_block(block);
    }

    pub fn provide(&mut self, key: cid::Cid) {
        self.routing.provide(key);
    }

    pub fn update_routing_table(&mut self, peer: libp2p::PeerId) {
        self.routing.update(peer);
    }

    pub fn remove_peer(&mut self, peer: &libp2p::PeerId) {
        self.routing.remove_peer(peer);
    }
}

impl<T: SwarmTypes> NetworkBehaviourEventProcess<BitswapEvent> for Behaviour<T> {
    fn inject_event(&mut self, event: BitswapEvent) {
        if let BitswapEvent::NeedProviders { cid } = &event {
            self.routing
                .find_providers(cid.clone(), bitswap::DEFAULT_PROVIDER_FANOUT);
        }
        self.events.push_back(event.into());
    }
}

impl<T: SwarmTypes> NetworkBehaviourEventProcess<RoutingEvent> for Behaviour<T> {
    fn inject_event(&mut self, event: RoutingEvent) {
        self.events.push_back(event.into());
    }
}

impl<T: SwarmTypes> NetworkBehaviourEventProcess<IdentifyEvent> for Behaviour<T> {
    fn inject_event(&mut self, event: IdentifyEvent) {
        self.events.push_back(event.into());
    }
}

impl<T: SwarmTypes> NetworkBehaviourEventProcess<PingEvent> for Behaviour<T> {
    fn inject_event(&mut self, event: PingEvent) {
        self.events.push_back(event.into());
    }
}

pub(crate) async fn build_behaviour<T: SwarmTypes>(
    options: SwarmOptions<T>,
    ipfs: crate::Ipfs<T>,
) -> Behaviour<T> {
    let _ = ipfs; // kept for symmetry with the teacher's builder signature; no state needed yet.

    Behaviour {
        bitswap: Bitswap::default(),
        routing: Routing::new(options.peer_id),
        identify: Identify::new(
            "/ipfs/0.1.0".into(),
            concat!("ipfs/", env!("CARGO_PKG_VERSION")).into(),
            options.keypair.public(),
        ),
        ping: Ping::new(PingConfig::new()),
        events: VecDeque::new(),
        _marker: PhantomData,
    }
}
