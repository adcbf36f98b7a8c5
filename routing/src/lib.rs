//! Implementation of the `/ipfs/kad/1.0.0` provider and peer routing overlay: a single
//! 256-bucket Kademlia routing table, the iterative lookup used to answer `FIND_NODE` /
//! `FIND_PROVIDERS` / `GET_VALUE`, the provider store, and the `libp2p` behaviour that drives it
//! all over the wire.

mod behaviour;
mod kbucket;
mod message;
mod protocol;
mod provider;
mod query;

pub use behaviour::{Routing, RoutingEvent};
pub use kbucket::{Key, RoutingTable, K_VALUE};
pub use message::{KadMessage, PeerInfo, SignedRecord};
pub use protocol::{KadConfig, KadProtocolError};
pub use provider::{ProviderStore, REPUBLISH_INTERVAL, TTL_PROVIDE};
pub use query::{QueryResult, QueryTarget, ALPHA, LOOKUP_TIMEOUT};
