use cid::Cid;
use std::fmt;

/// An immutable, content-addressed chunk of bytes.
///
/// The invariant `cid == hash(codec_of(cid), data)` is established once, at construction, and is
/// never re-checked by this type; callers that receive a `Block` from the network must validate it
/// themselves (see [`Block::verify`]) before trusting `cid`.
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    pub cid: Cid,
    pub data: Box<[u8]>,
}

impl Block {
    pub fn new(data: Box<[u8]>, cid: Cid) -> Self {
        Block { cid, data }
    }

    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Recomputes the hash of `data` under the hashing scheme named by `cid` and compares it
    /// against `cid` itself. A mismatch means the block was corrupted or lied about in transit.
    ///
    /// Only the default `sha2-256` hashing scheme is re-derivable here; blocks minted under another
    /// multihash code are assumed valid (callers that care can re-derive with the matching hasher).
    pub fn verify(&self) -> bool {
        match self.cid.hash().algorithm() {
            multihash::Hash::SHA2256 => Block::hash_matches(&self.cid, &self.data),
            _ => true,
        }
    }

    /// Whether `data` hashes, under `cid`'s own hashing scheme, to `cid`'s digest.
    ///
    /// Bitswap 1.0.0 blocks carry no CID on the wire (spec.md §6: `blocks: [bytes]`), so a
    /// receiver has to recognize which of its own wanted keys a raw payload satisfies by hashing
    /// it under each candidate key's own hash algorithm in turn, rather than decoding a CID out of
    /// the bytes directly. Unlike [`Block::verify`], an unsupported hash algorithm never matches —
    /// this is used to pick a candidate out of several, not to trust one already chosen.
    pub fn hash_matches(cid: &Cid, data: &[u8]) -> bool {
        use multihash::{Hash, Multihash};

        match cid.hash().algorithm() {
            Hash::SHA2256 => {
                let expected = Multihash::from(multihash::Sha2_256::digest(data));
                expected.as_bytes() == cid.hash().as_bytes()
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "Block {{ cid: {}, {} bytes }}", self.cid, self.data.len())
    }
}
