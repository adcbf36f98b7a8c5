//! The one hashing primitive used to mint block CIDs anywhere in this crate: sha2-256 wrapped as a
//! CIDv0. Shared by the file adder and the directory/HAMT builders so a block's key is always
//! derived the same way regardless of which part of the tree produced it.

use cid::Cid;

pub fn cid_for_dag_pb(bytes: &[u8]) -> Cid {
    let hash = multihash::Sha2_256::digest(bytes);
    Cid::new_v0(hash).expect("sha2-256 multihash is always a valid CIDv0 hash")
}
