//! The `/ipfs/bitswap/1.0.0` wire message and the in-memory representation built around it.

use crate::block::Block;
use crate::ledger::Priority;
use cid::Cid;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::fmt;

/// Generated from `proto/bitswap.proto` by `prost-build`; kept in its own module so the raw,
/// protobuf-shaped types never leak past [`BitswapMessage`].
pub mod pb {
    include!(concat!(env!("OUT_DIR"), "/bitswap.pb.rs"));
}

/// One want-list entry, either a new/updated want or a cancellation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub cid: Cid,
    pub priority: Priority,
    pub cancel: bool,
}

impl Entry {
    pub fn new(cid: Cid, priority: Priority) -> Self {
        Entry {
            cid,
            priority,
            cancel: false,
        }
    }

    pub fn cancel(cid: Cid) -> Self {
        Entry {
            cid,
            priority: 0,
            cancel: true,
        }
    }
}

/// A decoded or in-construction Bitswap message.
///
/// `full = true` means "this wantlist entirely replaces whatever the receiver already recorded for
/// us"; `full = false` means "apply these entries as a delta to what's already recorded".
///
/// `blocks` are carried as raw payload bytes, matching the wire format exactly (spec.md §6:
/// `blocks: [bytes]`, no CID alongside): bitswap 1.0.0 never puts a block's key on the wire, so a
/// receiver has to recognize which of its own wanted keys a payload answers by hashing it, not by
/// decoding a CID out of the message itself (see [`Block::hash_matches`]).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BitswapMessage {
    full: bool,
    wantlist: Vec<Entry>,
    blocks: Vec<Box<[u8]>>,
}

impl BitswapMessage {
    pub fn new(full: bool) -> Self {
        BitswapMessage {
            full,
            wantlist: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn wantlist(&self) -> &[Entry] {
        &self.wantlist
    }

    /// Raw block payloads, exactly as they'll appear (or appeared) on the wire — no CID attached.
    pub fn blocks(&self) -> &[Box<[u8]>] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.wantlist.is_empty() && self.blocks.is_empty()
    }

    pub fn want_block(&mut self, cid: Cid, priority: Priority) -> &mut Self {
        self.wantlist.push(Entry::new(cid, priority));
        self
    }

    pub fn cancel_block(&mut self, cid: Cid) -> &mut Self {
        self.wantlist.push(Entry::cancel(cid));
        self
    }

    /// Queues `block` for sending. Only its bytes travel on the wire (spec.md §6); `block.cid` is
    /// the caller's own bookkeeping and is discarded here.
    pub fn add_block(&mut self, block: Block) -> &mut Self {
        self.blocks.push(block.data);
        self
    }

    /// Approximate on-wire size; used to decide when a batched outgoing message must flush before
    /// the coalescing window elapses.
    pub fn encoded_len_estimate(&self) -> usize {
        self.wantlist
            .iter()
            .map(|e| e.cid.to_bytes().len() + 8)
            .sum::<usize>()
            + self.blocks.iter().map(|b| b.len()).sum::<usize>()
    }
}

impl From<BitswapMessage> for pb::Message {
    fn from(msg: BitswapMessage) -> pb::Message {
        let entries = msg
            .wantlist
            .into_iter()
            .map(|e| pb::message::wantlist::Entry {
                block: e.cid.to_bytes(),
                priority: e.priority,
                cancel: e.cancel,
            })
            .collect();

        pb::Message {
            wantlist: Some(pb::message::Wantlist {
                entries,
                full: msg.full,
            }),
            blocks: msg.blocks.into_iter().map(|b| b.into_vec()).collect(),
        }
    }
}

impl TryFrom<pb::Message> for BitswapMessage {
    type Error = MessageDecodeError;

    fn try_from(raw: pb::Message) -> Result<Self, Self::Error> {
        let (full, raw_entries) = match raw.wantlist {
            Some(wl) => (wl.full, wl.entries),
            None => (false, Vec::new()),
        };

        let mut wantlist = Vec::with_capacity(raw_entries.len());
        for entry in raw_entries {
            let cid = Cid::try_from(entry.block).map_err(MessageDecodeError::InvalidCid)?;
            wantlist.push(Entry {
                cid,
                priority: entry.priority,
                cancel: entry.cancel,
            });
        }

        let blocks = raw.blocks.into_iter().map(Vec::into_boxed_slice).collect();

        Ok(BitswapMessage {
            full,
            wantlist,
            blocks,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MessageDecodeError {
    #[error("malformed protobuf bitswap message: {0}")]
    Protobuf(#[from] prost::DecodeError),
    #[error("invalid cid in bitswap message: {0}")]
    InvalidCid(cid::Error),
}

impl fmt::Display for BitswapMessage {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            fmt,
            "BitswapMessage {{ full: {}, wants: {}, blocks: {} }}",
            self.full,
            self.wantlist.len(),
            self.blocks.len()
        )
    }
}

/// Merges `delta` entries into `existing`, keyed by Cid, honoring cancellation. Used by
/// [`crate::ledger::Ledger`] to fold a `full = false` message into the remembered peer want-list.
pub fn merge_delta(existing: &mut HashMap<Cid, Priority>, delta: &[Entry]) {
    for entry in delta {
        if entry.cancel {
            existing.remove(&entry.cid);
        } else {
            existing.insert(entry.cid, entry.priority);
        }
    }
}
