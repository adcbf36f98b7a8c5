//! A minimal record of one live connection, surfaced to callers through
//! [`crate::Ipfs::connections`] (spec.md §9: "higher layers hold peer IDs, not back-pointers" —
//! this is the one place that breaks that rule, deliberately, since it exists only to answer "who
//! am I connected to right now").

use libp2p::{Multiaddr, PeerId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub peer_id: PeerId,
    pub address: Multiaddr,
}
