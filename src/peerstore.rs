//! The peerstore: `PeerId -> known addresses`, outliving any particular connection (spec.md §3,
//! §9 — "peer records live in a peerstore owned by the node; components consult the peerstore by
//! ID" rather than holding back-pointers into live connections).
//!
//! Populated from two places: an explicit [`crate::Ipfs::connect`] call, and the `closer_peers`
//! carried in every routing RPC response, which is how a node learns addresses for peers it has
//! never dialed itself.

use libp2p::{Multiaddr, PeerId};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct Peerstore {
    addresses: Mutex<HashMap<PeerId, Vec<Multiaddr>>>,
}

impl Peerstore {
    pub fn new() -> Self {
        Peerstore::default()
    }

    /// Records `addr` as a way to reach `peer`, skipping it if already known.
    pub fn add_address(&self, peer: PeerId, addr: Multiaddr) {
        let mut guard = self.addresses.lock().expect("peerstore lock poisoned");
        let entry = guard.entry(peer).or_default();
        if !entry.contains(&addr) {
            entry.push(addr);
        }
    }

    pub fn addresses(&self, peer: &PeerId) -> Vec<Multiaddr> {
        self.addresses
            .lock()
            .expect("peerstore lock poisoned")
            .get(peer)
            .cloned()
            .unwrap_or_default()
    }
}
