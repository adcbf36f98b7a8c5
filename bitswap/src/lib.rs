//! Implementation of the `/ipfs/bitswap/1.0.0` block exchange protocol: per-peer want-lists,
//! accounting ledgers, the debt-ratio serving strategy, and the `libp2p` behaviour that drives it
//! all over the wire.

mod behaviour;
mod block;
mod ledger;
mod message;
mod protocol;
mod strategy;

pub use behaviour::{Bitswap, BitswapEvent, DEFAULT_PROVIDER_FANOUT};
pub use block::Block;
pub use ledger::{Ledger, LocalWantlist, Priority, Stats};
pub use message::{BitswapMessage, Entry};
pub use protocol::{BitswapConfig, BitswapProtocolError};
pub use strategy::{AlwaysSend, DebtRatioStrategy, Strategy};
